//! Weighted-pattern intent classification.

use std::sync::LazyLock;

use regex::Regex;
use rollcall_core::patterns::SERVICE_TERMS;
use rollcall_core::{Intent, IntentResult};

/// Score total that maps to confidence 1.0.
pub const DEFAULT_SCALE: f64 = 8.0;

/// Confidence reported when no rule fires.
pub const NO_MATCH_CONFIDENCE: f64 = 0.3;

struct Rule {
    id: &'static str,
    re: Regex,
    weight: f64,
}

fn rule(id: &'static str, pattern: &str, weight: f64) -> Rule {
    Rule {
        id,
        re: Regex::new(pattern).expect("static pattern compiles"),
        weight,
    }
}

fn service_alternation() -> String {
    let terms: Vec<String> = SERVICE_TERMS
        .iter()
        .map(|(term, _)| regex::escape(term))
        .collect();
    format!(r"\b(?:{})\b", terms.join("|"))
}

static RULES: LazyLock<Vec<(Intent, Vec<Rule>)>> = LazyLock::new(|| {
    vec![
        (
            Intent::FindBusiness,
            vec![
                rule(
                    "service_word",
                    r"\b(?:services?|vendors?|suppliers?|providers?|contractors?|agency|agencies|dealers?)\b",
                    2.0,
                ),
                rule("service_term", &service_alternation(), 2.0),
                rule(
                    "business_word",
                    r"\b(?:business|businesses|company|companies|firms?|shops?|stores?)\b",
                    1.5,
                ),
                rule(
                    "need",
                    r"\b(?:need|needs|looking for|want|require|recommend|hire|hiring)\b",
                    1.0,
                ),
                rule("turnover", r"\b(?:turnover|revenue|crores?|lakhs?)\b", 1.0),
            ],
        ),
        (
            Intent::FindPeers,
            vec![
                rule(
                    "batch",
                    r"\b(?:batch|batchmates?|classmates?|class of)\b",
                    3.0,
                ),
                rule("year", r"\b(?:19[5-9]\d|20[0-4]\d)\b", 2.0),
                rule(
                    "branch",
                    r"\b(?:mech(?:anical)?|civil|cse|ece|eee|eie|computer science|electrical|electronics|chemical|production|aero(?:nautical|space)?|automobile|instrumentation|biotech(?:nology)?|textile|mechatronics)\b",
                    1.5,
                ),
                rule(
                    "cohort",
                    r"\b(?:alumni|alumnus|peers|seniors?|juniors?|passed out|graduated|graduates)\b",
                    1.5,
                ),
            ],
        ),
        (
            Intent::FindSpecificPerson,
            vec![
                rule("who_is", r"\b(?:who is|who's|whos)\b", 2.0),
                rule(
                    "contact_of",
                    r"\b(?:contact|phone|number|email|mobile|details|profile)\s+(?:of|for)\b",
                    3.0,
                ),
                rule("named", r"\b(?:named|called|name is|know about)\b", 2.0),
                rule(
                    "honorific",
                    r"\b(?:mr|mrs|ms|dr|prof|shri|smt)\.?\s+[a-z]",
                    2.0,
                ),
                rule(
                    "email",
                    r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}",
                    4.0,
                ),
                rule("phone", r"\+?\d(?:[\s-]?\d){9,}", 3.0),
            ],
        ),
        (
            Intent::FindAlumniBusiness,
            vec![
                rule(
                    "alumni_business",
                    r"\b(?:alumni|alumnus|batchmates?|classmates?|graduates?|passed out)\b.{0,40}?\b(?:business(?:es)?|compan(?:y|ies)|firms?|entrepreneurs?|startups?|owners?|run|runs|running|own|owns)\b",
                    4.0,
                ),
                rule(
                    "run_business",
                    r"\b(?:run|runs|running|own|owns|owning|started)\s+(?:a\s+|an\s+|their\s+own\s+|own\s+)?(?:business(?:es)?|compan(?:y|ies)|firms?|startups?)\b",
                    3.0,
                ),
                rule(
                    "entrepreneur",
                    r"\b(?:entrepreneurs?|founders?|business owners?|startups?)\b",
                    2.0,
                ),
            ],
        ),
    ]
});

/// Scores a query against fixed per-intent rule sets.
///
/// # Examples
///
/// ```
/// use rollcall_core::Intent;
/// use rollcall_extract::IntentClassifier;
///
/// let classifier = IntentClassifier::new();
/// let result = classifier.classify("1995 mechanical batch in Chennai");
/// assert_eq!(result.primary, Intent::FindPeers);
/// assert!(result.confidence >= 0.6);
///
/// let nothing = classifier.classify("hello there");
/// assert_eq!(nothing.primary, Intent::FindBusiness);
/// assert_eq!(nothing.confidence, 0.3);
/// ```
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    scale: f64,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        Self {
            scale: DEFAULT_SCALE,
        }
    }

    /// Use a different score-to-confidence scale factor.
    pub fn with_scale(scale: f64) -> Self {
        Self {
            scale: if scale > 0.0 { scale } else { DEFAULT_SCALE },
        }
    }

    /// Raw score per intent, in [`Intent::ALL`] order, plus fired rule ids.
    pub fn scores(&self, query: &str) -> ([f64; 4], Vec<String>) {
        let lower = query.trim().to_lowercase();
        let mut scores = [0.0; 4];
        let mut matched = Vec::new();
        for (intent, rules) in RULES.iter() {
            let slot = Intent::ALL
                .iter()
                .position(|i| i == intent)
                .unwrap_or_default();
            for rule in rules {
                let hits = rule.re.find_iter(&lower).count();
                if hits > 0 {
                    scores[slot] += rule.weight * hits as f64;
                    matched.push(format!("{intent}:{}", rule.id));
                }
            }
        }
        (scores, matched)
    }

    /// Classify a query.
    pub fn classify(&self, query: &str) -> IntentResult {
        let (scores, matched_patterns) = self.scores(query);

        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        let top = scores[best];
        if top <= 0.0 {
            return IntentResult {
                primary: Intent::FindBusiness,
                secondary: None,
                confidence: NO_MATCH_CONFIDENCE,
                matched_patterns,
            };
        }

        let mut secondary: Option<usize> = None;
        for (i, score) in scores.iter().enumerate() {
            if i == best || *score <= 0.0 || *score < top * 0.5 {
                continue;
            }
            if secondary.map_or(true, |s| *score > scores[s]) {
                secondary = Some(i);
            }
        }

        IntentResult {
            primary: Intent::ALL[best],
            secondary: secondary.map(|i| Intent::ALL[i]),
            confidence: (top / self.scale).clamp(0.0, 1.0),
            matched_patterns,
        }
    }
}
