use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rollcall_core::{
    BreakerConfig, ExtractionConfig, ExtractionMethod, Intent, LlmConfig, Member, ProviderError,
    SearchConfig,
};
use rollcall_extract::{GenerativeExtractor, HybridExtractor};
use rollcall_providers::{
    Completion, CompletionRequest, EmbeddingProvider, ProviderFactory, TextProvider,
};
use rollcall_query::{InMemorySessionStore, QueryOptions, QueryPipeline, SessionStore};
use rollcall_search::{EmbeddingVariant, HybridRetriever, MemberIndex, SearchBackend};

struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl TextProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().unwrap().pop_front() {
            Some(text) => Ok(Completion { text, usage: None }),
            None => Err(ProviderError::InvalidResponse {
                provider: "scripted".into(),
                message: "script exhausted".into(),
            }),
        }
    }
}

struct FixedEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

struct Harness {
    pipeline: QueryPipeline,
    text: Arc<ScriptedProvider>,
    embedder: Arc<FixedEmbedder>,
    sessions: Arc<InMemorySessionStore>,
}

fn directory() -> Vec<Member> {
    vec![
        Member {
            graduation_year: Some(1995),
            branch: Some("Mechanical".into()),
            city: Some("Chennai".into()),
            designation: Some("Plant Head".into()),
            ..Member::new("m1", "Arun Prakash")
        },
        Member {
            graduation_year: Some(1996),
            branch: Some("Mechanical".into()),
            city: Some("Chennai".into()),
            ..Member::new("m2", "Bala Subramanian")
        },
        Member {
            graduation_year: Some(1995),
            branch: Some("Civil".into()),
            city: Some("Madurai".into()),
            ..Member::new("m3", "Mrs. Fatima Mary")
        },
        Member {
            graduation_year: Some(1998),
            city: Some("Madurai".into()),
            ..Member::new("m4", "Fatima Begum")
        },
    ]
}

fn harness(replies: &[&str]) -> Harness {
    let index = MemberIndex::in_memory().unwrap();
    for (i, member) in directory().iter().enumerate() {
        let angle = 0.2 * i as f32;
        index
            .upsert_member(
                member,
                &[EmbeddingVariant {
                    kind: "profile".into(),
                    vector: vec![angle.cos(), angle.sin()],
                }],
            )
            .unwrap();
    }

    let text = Arc::new(ScriptedProvider {
        replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        calls: AtomicUsize::new(0),
    });
    let embedder = Arc::new(FixedEmbedder {
        calls: AtomicUsize::new(0),
    });
    let breaker = BreakerConfig {
        max_retries: 0,
        ..BreakerConfig::default()
    };
    let factory = Arc::new(
        ProviderFactory::new(&breaker)
            .with_text_provider(text.clone())
            .with_embedding_provider(embedder.clone()),
    );

    let generative = GenerativeExtractor::new(factory.clone(), &LlmConfig::default(), 2025);
    let extractor =
        HybridExtractor::new(Some(generative), ExtractionConfig::default()).with_current_year(2025);
    let backend: Arc<dyn SearchBackend> = Arc::new(index);
    let retriever = HybridRetriever::new(backend, factory, SearchConfig::default());
    let sessions = Arc::new(InMemorySessionStore::default());
    let pipeline = QueryPipeline::new(extractor, retriever).with_sessions(sessions.clone());

    Harness {
        pipeline,
        text,
        embedder,
        sessions,
    }
}

const PERSON_REPLY: &str = r#"{
  "intent": "find_specific_person",
  "entities": {"name": "Fatima Mary"},
  "searchQuery": "Fatima Mary",
  "confidence": 0.95
}"#;

#[tokio::test]
async fn batch_query_filters_without_generative_call() {
    let h = harness(&[]);

    let response = h
        .pipeline
        .search("1995 mechanical batch in Chennai", 10, None)
        .await
        .unwrap();

    assert_eq!(h.text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.intent.primary, Intent::FindPeers);
    assert_eq!(response.method, ExtractionMethod::Regex);
    assert_eq!(response.filters.graduation_years, vec![1995]);
    assert_eq!(response.filters.location.as_deref(), Some("Chennai"));
    let ids: Vec<&str> = response.members.iter().map(|m| m.member.id.as_str()).collect();
    assert_eq!(ids, vec!["m1"]);
    assert_eq!(response.pagination.total, 1);
}

#[tokio::test]
async fn person_lookup_returns_only_the_named_member() {
    let h = harness(&[PERSON_REPLY]);

    let response = h.pipeline.search("fatima mary", 10, None).await.unwrap();

    assert_eq!(h.text.calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.intent.primary, Intent::FindSpecificPerson);
    assert_eq!(response.method, ExtractionMethod::Hybrid);
    assert_eq!(response.members.len(), 1);
    assert_eq!(response.members[0].member.id, "m3");
    assert!(response.members[0].is_exact_match);
}

#[tokio::test]
async fn repeated_query_uses_cache_and_session_records_turns() {
    let h = harness(&[PERSON_REPLY]);
    let options = QueryOptions {
        session: Some("s1".into()),
        ..QueryOptions::default()
    };

    let first = h.pipeline.search_with("fatima mary", &options).await.unwrap();
    // No session, so no stored context: same cache key as the first call.
    let second = h
        .pipeline
        .search_with("Fatima  Mary", &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(h.text.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.method, ExtractionMethod::Hybrid);
    assert_eq!(second.method, ExtractionMethod::Cached);
    assert_eq!(second.members, first.members);

    let context = h.sessions.context("s1").unwrap();
    assert!(context.contains("User asked: fatima mary"));
    assert!(context.contains("Mrs. Fatima Mary"));
}

#[tokio::test]
async fn empty_result_set_suggests_relaxing() {
    let h = harness(&[]);

    let response = h
        .pipeline
        .search("1995 mechanical batch in Madurai", 10, None)
        .await
        .unwrap();

    assert!(response.members.is_empty());
    assert_eq!(response.pagination.total, 0);
    assert_eq!(
        response.suggestions[0],
        "Search all cities instead of only Madurai"
    );
}

#[tokio::test]
async fn blank_query_short_circuits() {
    let h = harness(&[]);

    let response = h.pipeline.search("   ", 10, None).await.unwrap();

    assert!(response.members.is_empty());
    assert_eq!(h.text.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert!(!response.suggestions.is_empty());
}

#[tokio::test]
async fn paging_is_reported() {
    let h = harness(&[]);
    let options = QueryOptions {
        max_results: 1,
        page: 2,
        ..QueryOptions::default()
    };

    let response = h
        .pipeline
        .search_with("mechanical alumni in Chennai", &options)
        .await
        .unwrap();

    assert_eq!(response.pagination.page, 2);
    assert_eq!(response.pagination.per_page, 1);
    assert_eq!(response.members.len(), 1);
}
