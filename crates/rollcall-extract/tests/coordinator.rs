use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rollcall_core::{
    BreakerConfig, ExtractionConfig, ExtractionMethod, FieldSource, Intent, LlmConfig,
    ProviderError,
};
use rollcall_extract::{ExtractionStage, FallbackReason, GenerativeExtractor, HybridExtractor};
use rollcall_providers::{Completion, CompletionRequest, ProviderFactory, TextProvider};

/// Replies from a fixed script, counting calls.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(ProviderError::InvalidResponse {
                provider: "scripted".into(),
                message: "script exhausted".into(),
            })
        })
        .map(|text| Completion { text, usage: None })
    }
}

fn extractor(provider: Arc<ScriptedProvider>) -> HybridExtractor {
    let breaker = BreakerConfig {
        max_retries: 0,
        base_delay_ms: 1,
        max_delay_ms: 1,
        ..BreakerConfig::default()
    };
    let factory = ProviderFactory::new(&breaker).with_text_provider(provider);
    let generative = GenerativeExtractor::new(Arc::new(factory), &LlmConfig::default(), 2025);
    HybridExtractor::new(Some(generative), ExtractionConfig::default()).with_current_year(2025)
}

const GOOD_REPLY: &str = r#"```json
{
  "intent": "find_business",
  "entities": {"skills": ["python", "Java", "Spring"], "location": "chennai"},
  "searchQuery": "python java spring",
  "confidence": 0.9
}
```"#;

#[tokio::test]
async fn reference_query_never_calls_provider() {
    let provider = ScriptedProvider::new(vec![Ok(GOOD_REPLY)]);
    let outcome = extractor(provider.clone())
        .extract("1995 mechanical batch in Chennai", None)
        .await;

    assert_eq!(provider.calls(), 0);
    assert_eq!(outcome.intent.primary, Intent::FindPeers);
    assert_eq!(outcome.extraction.method, ExtractionMethod::Regex);
    assert!(outcome.extraction.confidence >= 0.75);
    let entities = &outcome.extraction.entities;
    assert_eq!(entities.graduation_year, vec![1995]);
    assert_eq!(entities.branch, vec!["Mechanical"]);
    assert_eq!(entities.location.as_deref(), Some("Chennai"));
    assert_eq!(outcome.fallback, None);
}

#[tokio::test]
async fn low_intent_confidence_merges_generative_reply() {
    let provider = ScriptedProvider::new(vec![Ok(GOOD_REPLY)]);
    let outcome = extractor(provider.clone())
        .extract("python or java developers", None)
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.fallback, Some(FallbackReason::LowIntentConfidence));
    assert_eq!(outcome.extraction.method, ExtractionMethod::Hybrid);
    assert_eq!(
        outcome.stages,
        vec![
            ExtractionStage::RegexOnly,
            ExtractionStage::LlmFallback,
            ExtractionStage::Merge,
            ExtractionStage::Done
        ]
    );

    let entities = &outcome.extraction.entities;
    assert_eq!(entities.skills, vec!["Python", "Java", "Spring"]);
    assert_eq!(entities.location.as_deref(), Some("Chennai"));
    assert_eq!(outcome.extraction.provenance["skills"], FieldSource::Both);
    assert_eq!(outcome.extraction.provenance["location"], FieldSource::Llm);
    assert_eq!(
        outcome.extraction.search_query.as_deref(),
        Some("python java spring")
    );
    // 0.4 * 0.55 + 0.6 * 0.9
    assert!((outcome.extraction.confidence - 0.76).abs() < 1e-9);
}

#[tokio::test]
async fn one_invalid_reply_is_repaired() {
    let provider = ScriptedProvider::new(vec![Ok("I cannot help with that"), Ok(GOOD_REPLY)]);
    let outcome = extractor(provider.clone())
        .extract("python or java developers", None)
        .await;

    assert_eq!(provider.calls(), 2);
    assert_eq!(outcome.extraction.method, ExtractionMethod::Hybrid);
}

#[tokio::test]
async fn two_invalid_replies_recover_to_regex() {
    let provider = ScriptedProvider::new(vec![
        Ok("not json"),
        Ok(r#"{"intent": "find_unicorns"}"#),
    ]);
    let outcome = extractor(provider.clone())
        .extract("python or java developers", None)
        .await;

    assert_eq!(provider.calls(), 2);
    assert_eq!(outcome.extraction.method, ExtractionMethod::Regex);
    assert_eq!(outcome.extraction.entities.skills, vec!["Python", "Java"]);
    // max(0.55 * 0.8, 0.3)
    assert!((outcome.extraction.confidence - 0.44).abs() < 1e-9);
    assert_eq!(
        outcome.stages,
        vec![
            ExtractionStage::RegexOnly,
            ExtractionStage::LlmFallback,
            ExtractionStage::ErrorRecovery,
            ExtractionStage::Done
        ]
    );
}

#[tokio::test]
async fn provider_failure_recovers_with_confidence_floor() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::Auth {
        provider: "scripted".into(),
        message: "bad key".into(),
    })]);
    let outcome = extractor(provider.clone()).extract("hello there", None).await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.fallback, Some(FallbackReason::LowRegexConfidence));
    assert_eq!(outcome.extraction.method, ExtractionMethod::Regex);
    assert_eq!(outcome.extraction.confidence, 0.3);
    assert!(outcome.extraction.entities.is_empty());
}

#[tokio::test]
async fn generative_intent_becomes_primary() {
    let reply = r#"{"intent": "find_specific_person", "entities": {"name": "Fatima Mary"}, "confidence": 80}"#;
    let provider = ScriptedProvider::new(vec![Ok(reply)]);
    let outcome = extractor(provider.clone())
        .extract("who is the caterer fatima", None)
        .await;

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcome.intent.primary, Intent::FindSpecificPerson);
    assert_eq!(
        outcome.extraction.entities.name.as_deref(),
        Some("Fatima Mary")
    );
}

#[tokio::test]
async fn without_providers_regex_result_is_unchanged() {
    let factory = ProviderFactory::new(&BreakerConfig::default());
    let generative = GenerativeExtractor::new(Arc::new(factory), &LlmConfig::default(), 2025);
    let extractor = HybridExtractor::new(Some(generative), ExtractionConfig::default())
        .with_current_year(2025);

    let outcome = extractor.extract("python or java developers", None).await;
    assert_eq!(outcome.extraction.method, ExtractionMethod::Regex);
    assert!((outcome.extraction.confidence - 0.55).abs() < 1e-9);
    assert_eq!(
        outcome.stages,
        vec![ExtractionStage::RegexOnly, ExtractionStage::Done]
    );
}
