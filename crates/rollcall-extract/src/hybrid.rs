//! Confidence-gated coordination of the regex and generative extractors.
//!
//! ```text
//! REGEX_ONLY ──────────────────────────────► DONE
//! REGEX_ONLY ─► LLM_FALLBACK ─► MERGE ─────► DONE
//!                    └─────► ERROR_RECOVERY ─► DONE
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use rollcall_core::names::has_name_shaped_substring;
use rollcall_core::{
    ExtractedEntities, ExtractionConfig, ExtractionMethod, ExtractionResult, FieldSource, Intent,
    IntentResult,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::generative::GenerativeExtractor;
use crate::intent::IntentClassifier;
use crate::prompt::GenerativeExtraction;
use crate::regex_extract::{EntityFamily, RegexExtraction, RegexExtractor};

static CONJUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:and|or|but)\b").expect("static pattern compiles"));

/// Coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    RegexOnly,
    LlmFallback,
    Merge,
    ErrorRecovery,
    Done,
}

impl fmt::Display for ExtractionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionStage::RegexOnly => "REGEX_ONLY",
            ExtractionStage::LlmFallback => "LLM_FALLBACK",
            ExtractionStage::Merge => "MERGE",
            ExtractionStage::ErrorRecovery => "ERROR_RECOVERY",
            ExtractionStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// Why the generative path was entered. Variants are listed in the order
/// they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    LowRegexConfidence,
    LowIntentConfidence,
    UnnamedPersonQuery,
    Conjunction,
    NoPatterns,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FallbackReason::LowRegexConfidence => "regex confidence below threshold",
            FallbackReason::LowIntentConfidence => "intent confidence below threshold",
            FallbackReason::UnnamedPersonQuery => "person query without a name-shaped phrase",
            FallbackReason::Conjunction => "query contains a conjunction",
            FallbackReason::NoPatterns => "no pattern family matched",
        };
        f.write_str(text)
    }
}

/// Everything the coordinator decided for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridOutcome {
    pub intent: IntentResult,
    pub extraction: ExtractionResult,
    pub families: Vec<EntityFamily>,
    pub fallback: Option<FallbackReason>,
    pub stages: Vec<ExtractionStage>,
}

/// First fallback condition that holds, if any.
///
/// # Examples
///
/// ```
/// use rollcall_core::ExtractionConfig;
/// use rollcall_extract::{fallback_reason, FallbackReason, IntentClassifier, RegexExtractor};
///
/// let query = "python or java developers";
/// let intent = IntentClassifier::new().classify(query);
/// let regex = RegexExtractor::with_current_year(2025).extract(query);
/// let reason = fallback_reason(query, &intent, &regex, &ExtractionConfig::default());
/// assert!(reason.is_some());
/// ```
pub fn fallback_reason(
    raw_query: &str,
    intent: &IntentResult,
    regex: &RegexExtraction,
    config: &ExtractionConfig,
) -> Option<FallbackReason> {
    if regex.confidence < config.regex_threshold {
        return Some(FallbackReason::LowRegexConfidence);
    }
    if intent.confidence < config.intent_threshold {
        return Some(FallbackReason::LowIntentConfidence);
    }
    if intent.primary == Intent::FindSpecificPerson && !has_name_shaped_substring(raw_query) {
        return Some(FallbackReason::UnnamedPersonQuery);
    }
    if CONJUNCTION.is_match(&raw_query.to_lowercase()) {
        return Some(FallbackReason::Conjunction);
    }
    if regex.families.is_empty() {
        return Some(FallbackReason::NoPatterns);
    }
    None
}

/// Union two lists, de-duplicated case-insensitively, `first` items first.
fn union(first: &[String], second: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(first.len() + second.len());
    for item in first.iter().chain(second) {
        if !out.iter().any(|o| o.eq_ignore_ascii_case(item)) {
            out.push(item.clone());
        }
    }
    out
}

fn prefer<T: Clone>(
    name: &str,
    regex: &Option<T>,
    llm: &Option<T>,
    provenance: &mut BTreeMap<String, FieldSource>,
) -> Option<T> {
    match (regex, llm) {
        (Some(value), _) => {
            provenance.insert(name.into(), FieldSource::Regex);
            Some(value.clone())
        }
        (None, Some(value)) => {
            provenance.insert(name.into(), FieldSource::Llm);
            Some(value.clone())
        }
        (None, None) => None,
    }
}

fn prefer_list<T: Clone>(
    name: &str,
    regex: &[T],
    llm: &[T],
    provenance: &mut BTreeMap<String, FieldSource>,
) -> Vec<T> {
    if !regex.is_empty() {
        provenance.insert(name.into(), FieldSource::Regex);
        regex.to_vec()
    } else if !llm.is_empty() {
        provenance.insert(name.into(), FieldSource::Llm);
        llm.to_vec()
    } else {
        Vec::new()
    }
}

fn union_field(
    name: &str,
    regex: &[String],
    llm: &[String],
    provenance: &mut BTreeMap<String, FieldSource>,
) -> Vec<String> {
    let source = match (regex.is_empty(), llm.is_empty()) {
        (false, false) => Some(FieldSource::Both),
        (false, true) => Some(FieldSource::Regex),
        (true, false) => Some(FieldSource::Llm),
        (true, true) => None,
    };
    if let Some(source) = source {
        provenance.insert(name.into(), source);
    }
    union(regex, llm)
}

/// Field-by-field merge of regex and generative entities.
///
/// # Examples
///
/// ```
/// use rollcall_core::ExtractedEntities;
/// use rollcall_extract::merge_entities;
///
/// let regex = ExtractedEntities { skills: vec!["Python".into()], ..Default::default() };
/// let llm = ExtractedEntities {
///     skills: vec!["python".into(), "SQL".into()],
///     name: Some("Anand".into()),
///     ..Default::default()
/// };
/// let (merged, _) = merge_entities(&regex, &llm);
/// assert_eq!(merged.skills, vec!["Python", "SQL"]);
/// assert_eq!(merged.name.as_deref(), Some("Anand"));
/// ```
pub fn merge_entities(
    regex: &ExtractedEntities,
    llm: &ExtractedEntities,
) -> (ExtractedEntities, BTreeMap<String, FieldSource>) {
    let mut provenance = BTreeMap::new();
    let mut merged = ExtractedEntities {
        graduation_year: prefer_list(
            "graduationYear",
            &regex.graduation_year,
            &llm.graduation_year,
            &mut provenance,
        ),
        location: prefer("location", &regex.location, &llm.location, &mut provenance),
        branch: prefer_list("branch", &regex.branch, &llm.branch, &mut provenance),
        turnover_requirement: prefer(
            "turnoverRequirement",
            &regex.turnover_requirement,
            &llm.turnover_requirement,
            &mut provenance,
        ),
        degree: union_field("degree", &regex.degree, &llm.degree, &mut provenance),
        skills: union_field("skills", &regex.skills, &llm.skills, &mut provenance),
        services: union_field("services", &regex.services, &llm.services, &mut provenance),
        name: llm.name.clone(),
        organization_name: llm.organization_name.clone(),
    };
    if merged.name.is_some() {
        provenance.insert("name".into(), FieldSource::Llm);
    }
    if merged.organization_name.is_some() {
        provenance.insert("organizationName".into(), FieldSource::Llm);
    }
    merged.enforce_disjoint();
    if merged.services.is_empty() {
        provenance.remove("services");
    }
    (merged, provenance)
}

/// Generative intent replaces the classifier's; the classifier's primary
/// becomes the secondary when they disagree.
pub fn merge_intent(classified: &IntentResult, generative: Option<Intent>) -> IntentResult {
    match generative {
        Some(intent) if intent != classified.primary => IntentResult {
            primary: intent,
            secondary: Some(classified.primary),
            ..classified.clone()
        },
        _ => classified.clone(),
    }
}

fn regex_provenance(entities: &ExtractedEntities) -> BTreeMap<String, FieldSource> {
    let present = [
        ("graduationYear", !entities.graduation_year.is_empty()),
        ("location", entities.location.is_some()),
        ("degree", !entities.degree.is_empty()),
        ("branch", !entities.branch.is_empty()),
        ("skills", !entities.skills.is_empty()),
        ("services", !entities.services.is_empty()),
        ("turnoverRequirement", entities.turnover_requirement.is_some()),
    ];
    present
        .into_iter()
        .filter(|(_, is_present)| *is_present)
        .map(|(name, _)| (name.to_string(), FieldSource::Regex))
        .collect()
}

/// Runs classification and regex extraction, and decides whether the
/// generative path is needed.
///
/// # Examples
///
/// ```
/// use rollcall_core::{ExtractionConfig, ExtractionMethod, Intent};
/// use rollcall_extract::HybridExtractor;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let extractor = HybridExtractor::regex_only(ExtractionConfig::default()).with_current_year(2025);
/// let outcome = extractor.extract("1995 mechanical batch in Chennai", None).await;
/// assert_eq!(outcome.intent.primary, Intent::FindPeers);
/// assert_eq!(outcome.extraction.method, ExtractionMethod::Regex);
/// assert!(outcome.fallback.is_none());
/// # }
/// ```
#[derive(Debug)]
pub struct HybridExtractor {
    classifier: IntentClassifier,
    regex: RegexExtractor,
    generative: Option<GenerativeExtractor>,
    config: ExtractionConfig,
}

impl HybridExtractor {
    pub fn new(generative: Option<GenerativeExtractor>, config: ExtractionConfig) -> Self {
        Self {
            classifier: IntentClassifier::new(),
            regex: RegexExtractor::new(),
            generative,
            config,
        }
    }

    /// Coordinator without a generative path.
    pub fn regex_only(config: ExtractionConfig) -> Self {
        Self::new(None, config)
    }

    /// Pin the calendar year used for year plausibility.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.regex = RegexExtractor::with_current_year(year);
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn regex(&self) -> &RegexExtractor {
        &self.regex
    }

    /// Run the state machine for one query. Never fails: fallback errors
    /// recover to the regex result.
    pub async fn extract(&self, query: &str, context: Option<&str>) -> HybridOutcome {
        let started = Instant::now();
        let mut stages = vec![ExtractionStage::RegexOnly];

        let intent = self.classifier.classify(query);
        let regex = self.regex.extract(query);
        debug!(
            intent = %intent.primary,
            intent_confidence = intent.confidence,
            regex_confidence = regex.confidence,
            families = ?regex.families,
            "REGEX_ONLY"
        );

        let fallback = fallback_reason(query, &intent, &regex, &self.config);
        let regex_result = ExtractionResult {
            provenance: regex_provenance(&regex.entities),
            entities: regex.entities.clone(),
            confidence: regex.confidence,
            method: ExtractionMethod::Regex,
            elapsed_ms: 0,
            search_query: None,
        };

        let generative = match (fallback, &self.generative) {
            (Some(reason), Some(generative)) if generative.is_available() => {
                Some((reason, generative))
            }
            (Some(reason), _) => {
                debug!(%reason, "no completion provider configured, keeping regex result");
                None
            }
            (None, _) => None,
        };

        let (intent, mut extraction) = match generative {
            None => (intent, regex_result),
            Some((reason, generative)) => {
                transition(&mut stages, ExtractionStage::LlmFallback, &reason.to_string());
                match generative.extract(query, context, intent.primary).await {
                    Ok(llm) => {
                        transition(&mut stages, ExtractionStage::Merge, "generative reply parsed");
                        self.merge(&intent, &regex, llm)
                    }
                    Err(err) => {
                        warn!(error = %err, "generative extraction failed, recovering to regex");
                        transition(&mut stages, ExtractionStage::ErrorRecovery, &err.to_string());
                        let confidence = (regex_result.confidence * self.config.recovery_factor)
                            .max(self.config.recovery_floor);
                        (
                            intent,
                            ExtractionResult {
                                confidence,
                                ..regex_result
                            },
                        )
                    }
                }
            }
        };

        transition(&mut stages, ExtractionStage::Done, "extraction complete");
        extraction.elapsed_ms = started.elapsed().as_millis() as u64;

        HybridOutcome {
            intent,
            extraction,
            families: regex.families,
            fallback,
            stages,
        }
    }

    fn merge(
        &self,
        intent: &IntentResult,
        regex: &RegexExtraction,
        llm: GenerativeExtraction,
    ) -> (IntentResult, ExtractionResult) {
        let (entities, provenance) = merge_entities(&regex.entities, &llm.entities);
        let confidence = (self.config.regex_weight * regex.confidence
            + self.config.llm_weight * llm.confidence)
            .clamp(0.0, 1.0);
        (
            merge_intent(intent, llm.intent),
            ExtractionResult {
                entities,
                confidence,
                method: ExtractionMethod::Hybrid,
                elapsed_ms: 0,
                provenance,
                search_query: llm.search_query,
            },
        )
    }
}

fn transition(stages: &mut Vec<ExtractionStage>, to: ExtractionStage, why: &str) {
    let from = stages.last().copied().unwrap_or(ExtractionStage::RegexOnly);
    debug!(%from, %to, why, "extraction transition");
    stages.push(to);
}
