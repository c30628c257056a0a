//! Ordered failover across configured providers.
//!
//! Each provider owns its own [`CircuitState`] behind its own lock. A call
//! walks the providers in order: open breakers are skipped, transient
//! failures are retried with capped exponential backoff, anything else counts
//! toward the breaker and moves on. The first success wins.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rollcall_core::{BreakerConfig, ProviderFailure, RollcallConfig, RollcallError};
use tracing::{debug, info, warn};

use crate::breaker::{BreakerPolicy, CircuitState, Clock, SystemClock};
use crate::embedding::EmbeddingClient;
use crate::llm::CompletionClient;
use crate::provider::{Completion, CompletionRequest, EmbeddingProvider, TextProvider};

/// In-call retry schedule for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base × 2^attempt`,
    /// capped at `max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use rollcall_providers::RetryPolicy;
    ///
    /// let policy = RetryPolicy {
    ///     max_retries: 5,
    ///     base_delay: Duration::from_millis(100),
    ///     max_delay: Duration::from_millis(500),
    /// };
    /// assert_eq!(policy.delay(0), Duration::from_millis(100));
    /// assert_eq!(policy.delay(2), Duration::from_millis(400));
    /// assert_eq!(policy.delay(3), Duration::from_millis(500));
    /// ```
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(20);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl From<&BreakerConfig> for RetryPolicy {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

struct Slot<P: ?Sized> {
    provider: Arc<P>,
    state: Mutex<CircuitState>,
}

impl<P: ?Sized> Slot<P> {
    fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            state: Mutex::new(CircuitState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CircuitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fan-out over completion and embedding providers with per-provider
/// circuit breakers.
///
/// # Examples
///
/// ```
/// use rollcall_core::RollcallConfig;
/// use rollcall_providers::ProviderFactory;
///
/// let factory = ProviderFactory::from_config(&RollcallConfig::default()).unwrap();
/// assert!(!factory.has_text_providers());
/// assert!(!factory.has_embedding_providers());
/// ```
pub struct ProviderFactory {
    text: Vec<Slot<dyn TextProvider>>,
    embedding: Vec<Slot<dyn EmbeddingProvider>>,
    breaker: BreakerPolicy,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text: Vec<&str> = self.text.iter().map(|s| s.provider.name()).collect();
        let embedding: Vec<&str> = self.embedding.iter().map(|s| s.provider.name()).collect();
        f.debug_struct("ProviderFactory")
            .field("text", &text)
            .field("embedding", &embedding)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ProviderFactory {
    /// Empty factory with the given breaker/retry settings.
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            text: Vec::new(),
            embedding: Vec::new(),
            breaker: BreakerPolicy::from(config),
            retry: RetryPolicy::from(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Build HTTP clients for every configured provider, in listed order.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Provider`] if an HTTP client cannot be built.
    pub fn from_config(config: &RollcallConfig) -> rollcall_core::Result<Self> {
        let mut factory = Self::new(&config.breaker);
        let llm_timeout = Duration::from_secs(config.llm.timeout_secs);
        for provider in &config.llm.providers {
            let client = CompletionClient::new(provider, llm_timeout)?;
            factory = factory.with_text_provider(Arc::new(client));
        }
        let embed_timeout = Duration::from_secs(config.embedding.timeout_secs);
        for provider in &config.embedding.providers {
            let client = EmbeddingClient::new(provider, config.embedding.dimensions, embed_timeout)?
                .with_batch_size(config.embedding.batch_size);
            factory = factory.with_embedding_provider(Arc::new(client));
        }
        Ok(factory)
    }

    /// Append a completion provider (lowest priority so far).
    pub fn with_text_provider(mut self, provider: Arc<dyn TextProvider>) -> Self {
        self.text.push(Slot::new(provider));
        self
    }

    /// Append an embedding provider (lowest priority so far).
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding.push(Slot::new(provider));
        self
    }

    /// Replace the clock used for breaker timing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn has_text_providers(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn has_embedding_providers(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// Snapshot of a provider's breaker, by provider name.
    pub fn circuit_state(&self, name: &str) -> Option<CircuitState> {
        self.text
            .iter()
            .find(|slot| slot.provider.name() == name)
            .map(|slot| *slot.state())
            .or_else(|| {
                self.embedding
                    .iter()
                    .find(|slot| slot.provider.name() == name)
                    .map(|slot| *slot.state())
            })
    }

    /// Run a completion on the first healthy provider.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::ProvidersExhausted`] naming every provider
    /// and why it failed or was skipped.
    pub async fn generate(&self, request: &CompletionRequest) -> rollcall_core::Result<Completion> {
        call_with_failover(
            "completion",
            &self.text,
            &self.breaker,
            &self.retry,
            self.clock.as_ref(),
            move |provider| async move { provider.generate(request).await },
        )
        .await
    }

    /// Embed `texts` on the first healthy provider.
    ///
    /// A vector whose length differs from the provider's declared
    /// dimensions counts as a failure of that provider.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::ProvidersExhausted`] naming every provider
    /// and why it failed or was skipped.
    pub async fn embed(&self, texts: &[String]) -> rollcall_core::Result<Vec<Vec<f32>>> {
        call_with_failover(
            "embedding",
            &self.embedding,
            &self.breaker,
            &self.retry,
            self.clock.as_ref(),
            move |provider| async move {
                let vectors = provider.embed(texts).await?;
                check_dimensions(provider.as_ref(), &vectors)?;
                Ok::<_, rollcall_core::ProviderError>(vectors)
            },
        )
        .await
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// Same as [`ProviderFactory::embed`], plus [`RollcallError::Embedding`]
    /// if the provider returned no vector.
    pub async fn embed_one(&self, text: &str) -> rollcall_core::Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RollcallError::Embedding("provider returned no embedding".into()))
    }
}

fn check_dimensions(
    provider: &dyn EmbeddingProvider,
    vectors: &[Vec<f32>],
) -> Result<(), rollcall_core::ProviderError> {
    let expected = provider.dimensions();
    match vectors.iter().find(|v| v.len() != expected) {
        Some(bad) => Err(rollcall_core::ProviderError::DimensionMismatch {
            provider: provider.name().to_string(),
            expected,
            actual: bad.len(),
        }),
        None => Ok(()),
    }
}

async fn call_with_failover<P, T, F, Fut>(
    operation: &str,
    slots: &[Slot<P>],
    breaker: &BreakerPolicy,
    retry: &RetryPolicy,
    clock: &dyn Clock,
    mut call: F,
) -> rollcall_core::Result<T>
where
    P: Named + ?Sized,
    F: FnMut(Arc<P>) -> Fut,
    Fut: Future<Output = Result<T, rollcall_core::ProviderError>>,
{
    let mut failures = Vec::new();

    for slot in slots {
        if slot.state().is_open(clock.now(), breaker) {
            debug!(operation, provider = slot.provider.provider_name(), "circuit open, skipping");
            failures.push(ProviderFailure {
                provider: slot.provider.provider_name().to_string(),
                reason: "circuit open".into(),
            });
            continue;
        }

        let mut attempt = 0;
        loop {
            match call(Arc::clone(&slot.provider)).await {
                Ok(value) => {
                    slot.state().record_success();
                    info!(operation, provider = slot.provider.provider_name(), attempt, "provider call succeeded");
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    if attempt < retry.max_retries {
                        let mut delay = retry.delay(attempt);
                        if let rollcall_core::ProviderError::RateLimited {
                            retry_after: Some(after),
                            ..
                        } = &err
                        {
                            delay = delay.max(*after).min(retry.max_delay);
                        }
                        warn!(operation, provider = err.provider(), attempt, ?delay, error = %err, "transient failure, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    warn!(operation, provider = err.provider(), error = %err, "retries exhausted, failing over");
                    failures.push(ProviderFailure {
                        provider: slot.provider.provider_name().to_string(),
                        reason: err.reason(),
                    });
                    break;
                }
                Err(err) => {
                    let opened = slot.state().record_failure(clock.now(), breaker);
                    if opened {
                        warn!(operation, provider = err.provider(), "circuit opened");
                    }
                    warn!(operation, provider = err.provider(), fatal = err.is_fatal(), error = %err, "provider call failed, failing over");
                    failures.push(ProviderFailure {
                        provider: slot.provider.provider_name().to_string(),
                        reason: err.reason(),
                    });
                    break;
                }
            }
        }
    }

    Err(RollcallError::ProvidersExhausted {
        operation: operation.to_string(),
        failures,
    })
}

/// Name access shared by both provider traits.
trait Named {
    fn provider_name(&self) -> &str;
}

impl Named for dyn TextProvider {
    fn provider_name(&self) -> &str {
        self.name()
    }
}

impl Named for dyn EmbeddingProvider {
    fn provider_name(&self) -> &str {
        self.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::ManualClock;
    use crate::provider::ChatMessage;
    use async_trait::async_trait;
    use rollcall_core::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Completion provider that replays a fixed outcome and counts calls.
    struct ScriptedText {
        name: String,
        outcome: Result<String, ProviderError>,
        calls: AtomicUsize,
    }

    impl ScriptedText {
        fn ok(name: &str, text: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                outcome: Ok(text.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &str, err: ProviderError) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                outcome: Err(err),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextProvider for ScriptedText {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, _request: &CompletionRequest) -> Result<Completion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map(|text| Completion { text, usage: None })
        }
    }

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 5,
            cooldown_secs: 60,
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn http_500(name: &str) -> ProviderError {
        ProviderError::Http {
            provider: name.into(),
            status: 500,
            message: "boom".into(),
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user("hello")])
    }

    #[tokio::test]
    async fn first_success_wins() {
        let a = ScriptedText::ok("a", "from a");
        let b = ScriptedText::ok("b", "from b");
        let factory = ProviderFactory::new(&fast_config())
            .with_text_provider(a.clone())
            .with_text_provider(b.clone());
        let completion = factory.generate(&request()).await.unwrap();
        assert_eq!(completion.text, "from a");
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn breaker_skips_provider_until_cooldown() {
        let clock = Arc::new(ManualClock::new());
        let a = ScriptedText::failing("a", http_500("a"));
        let b = ScriptedText::ok("b", "from b");
        let factory = ProviderFactory::new(&fast_config())
            .with_text_provider(a.clone())
            .with_text_provider(b.clone())
            .with_clock(clock.clone());

        for _ in 0..5 {
            let completion = factory.generate(&request()).await.unwrap();
            assert_eq!(completion.text, "from b");
        }
        assert_eq!(a.calls(), 5);
        assert!(factory.circuit_state("a").unwrap().open);

        factory.generate(&request()).await.unwrap();
        assert_eq!(a.calls(), 5, "open breaker must skip a");

        clock.advance(Duration::from_secs(60));
        factory.generate(&request()).await.unwrap();
        assert_eq!(a.calls(), 6, "a is eligible again after the cool-down");
    }

    #[tokio::test]
    async fn transient_failures_retry_without_counting() {
        let a = ScriptedText::failing(
            "a",
            ProviderError::RateLimited {
                provider: "a".into(),
                retry_after: None,
            },
        );
        let b = ScriptedText::ok("b", "from b");
        let factory = ProviderFactory::new(&fast_config())
            .with_text_provider(a.clone())
            .with_text_provider(b.clone());

        let completion = factory.generate(&request()).await.unwrap();
        assert_eq!(completion.text, "from b");
        assert_eq!(a.calls(), 3, "one call plus two retries");
        assert_eq!(factory.circuit_state("a").unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn fatal_failures_are_not_retried_but_count() {
        let a = ScriptedText::failing(
            "a",
            ProviderError::Auth {
                provider: "a".into(),
                message: "bad key".into(),
            },
        );
        let b = ScriptedText::ok("b", "from b");
        let factory = ProviderFactory::new(&fast_config())
            .with_text_provider(a.clone())
            .with_text_provider(b);

        factory.generate(&request()).await.unwrap();
        assert_eq!(a.calls(), 1);
        assert_eq!(factory.circuit_state("a").unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn exhaustion_names_every_provider() {
        let a = ScriptedText::failing("a", http_500("a"));
        let b = ScriptedText::failing(
            "b",
            ProviderError::Timeout {
                provider: "b".into(),
            },
        );
        let factory = ProviderFactory::new(&fast_config())
            .with_text_provider(a)
            .with_text_provider(b);

        let err = factory.generate(&request()).await.unwrap_err();
        match err {
            RollcallError::ProvidersExhausted {
                operation,
                failures,
            } => {
                assert_eq!(operation, "completion");
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].provider, "a");
                assert_eq!(failures[0].reason, "HTTP 500: boom");
                assert_eq!(failures[1].provider, "b");
                assert_eq!(failures[1].reason, "request timed out");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn no_providers_is_an_aggregated_error() {
        let factory = ProviderFactory::new(&fast_config());
        let err = factory.embed(&["x".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("no providers configured"));
    }

    /// Embedding provider that declares `dimensions` but returns `actual`.
    struct SizedEmbedder {
        name: String,
        dimensions: usize,
        actual: usize,
        calls: AtomicUsize,
    }

    impl SizedEmbedder {
        fn new(name: &str, dimensions: usize, actual: usize) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                dimensions,
                actual,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for SizedEmbedder {
        fn name(&self) -> &str {
            &self.name
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![0.5; self.actual]).collect())
        }
    }

    #[tokio::test]
    async fn wrong_dimensions_fail_over() {
        let short = SizedEmbedder::new("short", 4, 3);
        let good = SizedEmbedder::new("good", 4, 4);
        let factory = ProviderFactory::new(&fast_config())
            .with_embedding_provider(short.clone())
            .with_embedding_provider(good.clone());

        let vector = factory.embed_one("anand").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(short.calls.load(Ordering::SeqCst), 1, "mismatch is not retried");
        assert_eq!(factory.circuit_state("short").unwrap().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn wrong_dimensions_are_reported() {
        let factory = ProviderFactory::new(&fast_config())
            .with_embedding_provider(SizedEmbedder::new("short", 4, 3));

        let err = factory.embed(&["anand".to_string()]).await.unwrap_err();
        match err {
            RollcallError::ProvidersExhausted { failures, .. } => {
                assert_eq!(failures[0].provider, "short");
                assert_eq!(failures[0].reason, "expected 4-dimensional embedding, got 3");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn backoff_is_capped() {
        let retry = RetryPolicy::from(&BreakerConfig::default());
        assert_eq!(retry.delay(0), Duration::from_millis(250));
        assert_eq!(retry.delay(1), Duration::from_millis(500));
        assert_eq!(retry.delay(10), Duration::from_millis(4000));
        assert_eq!(retry.delay(40), Duration::from_millis(4000));
    }
}
