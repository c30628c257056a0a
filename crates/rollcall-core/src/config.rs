use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RollcallError;

/// Top-level configuration loaded from `.rollcall.toml`.
///
/// Supports layered resolution: `--config` path > local config > defaults.
///
/// # Examples
///
/// ```
/// use rollcall_core::RollcallConfig;
///
/// let config = RollcallConfig::default();
/// assert_eq!(config.breaker.failure_threshold, 5);
/// assert_eq!(config.search.semantic_weight, 0.7);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollcallConfig {
    /// Completion providers used by the generative extractor.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding providers used by semantic retrieval.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Extraction thresholds and merge weights.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Retrieval weights and paging.
    #[serde(default)]
    pub search: SearchConfig,
    /// Circuit breaker and retry policy shared by every provider.
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Member index location.
    #[serde(default)]
    pub store: StoreConfig,
}

impl RollcallConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Io`] if the file cannot be read, or
    /// [`RollcallError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rollcall_core::RollcallConfig;
    /// use std::path::Path;
    ///
    /// let config = RollcallConfig::from_file(Path::new(".rollcall.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, RollcallError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_core::RollcallConfig;
    ///
    /// let toml = r#"
    /// [search]
    /// per_page = 25
    /// "#;
    /// let config = RollcallConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.search.per_page, 25);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, RollcallError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// One entry of `[[llm.providers]]` or `[[embedding.providers]]`.
///
/// Providers are tried in the order they are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used in logs and aggregated errors.
    pub name: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// OpenAI-compatible base URL (default: `https://api.openai.com/v1`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Inline API key. Prefer `api_key_env`.
    pub api_key: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

impl ProviderConfig {
    /// The API key, from `api_key` or else the variable named by `api_key_env`.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_core::ProviderConfig;
    ///
    /// let provider = ProviderConfig {
    ///     name: "local".into(),
    ///     model: "m".into(),
    ///     base_url: "http://localhost:8080".into(),
    ///     api_key: Some("sk-inline".into()),
    ///     api_key_env: Some("UNUSED_VAR".into()),
    /// };
    /// assert_eq!(provider.resolve_api_key().as_deref(), Some("sk-inline"));
    /// ```
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|key| !key.is_empty())
            })
    }
}

/// Completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ordered completion providers, primary first.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Per-call timeout in seconds (default: 15).
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Sampling temperature (default: 0.1).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token cap (default: 512).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_timeout() -> u64 {
    15
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    512
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Embedding provider settings.
///
/// # Examples
///
/// ```
/// use rollcall_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.dimensions, 1536);
/// assert_eq!(config.timeout_secs, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Ordered embedding providers, primary first.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Vector length every provider must return (default: 1536).
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Per-call timeout in seconds (default: 10).
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
    /// Texts per request (default: 64).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_dimensions() -> usize {
    1536
}

fn default_embedding_timeout() -> u64 {
    10
}

fn default_batch_size() -> usize {
    64
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            dimensions: default_dimensions(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
        }
    }
}

/// Thresholds that gate the generative fallback and weight the merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Regex confidence below which the generative path runs (default: 0.5).
    #[serde(default = "default_regex_threshold")]
    pub regex_threshold: f64,
    /// Intent confidence below which the generative path runs (default: 0.6).
    #[serde(default = "default_intent_threshold")]
    pub intent_threshold: f64,
    /// Weight of the regex confidence in a merged result (default: 0.4).
    #[serde(default = "default_regex_weight")]
    pub regex_weight: f64,
    /// Weight of the generative confidence in a merged result (default: 0.6).
    #[serde(default = "default_llm_weight")]
    pub llm_weight: f64,
    /// Confidence multiplier applied when the fallback fails (default: 0.8).
    #[serde(default = "default_recovery_factor")]
    pub recovery_factor: f64,
    /// Lowest confidence a recovered result reports (default: 0.3).
    #[serde(default = "default_recovery_floor")]
    pub recovery_floor: f64,
    /// Extraction results cached per session store (default: 256).
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_regex_threshold() -> f64 {
    0.5
}

fn default_intent_threshold() -> f64 {
    0.6
}

fn default_regex_weight() -> f64 {
    0.4
}

fn default_llm_weight() -> f64 {
    0.6
}

fn default_recovery_factor() -> f64 {
    0.8
}

fn default_recovery_floor() -> f64 {
    0.3
}

fn default_cache_capacity() -> usize {
    256
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            regex_threshold: default_regex_threshold(),
            intent_threshold: default_intent_threshold(),
            regex_weight: default_regex_weight(),
            llm_weight: default_llm_weight(),
            recovery_factor: default_recovery_factor(),
            recovery_floor: default_recovery_floor(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// Retrieval weights and paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight of the vector similarity score (default: 0.7).
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Weight of the normalized full-text score (default: 0.3).
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Candidates fetched from each search path (default: 100).
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Page size when the caller does not pass one (default: 10).
    #[serde(default = "default_per_page")]
    pub per_page: usize,
}

fn default_semantic_weight() -> f64 {
    0.7
}

fn default_keyword_weight() -> f64 {
    0.3
}

fn default_candidate_limit() -> usize {
    100
}

fn default_per_page() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            candidate_limit: default_candidate_limit(),
            per_page: default_per_page(),
        }
    }
}

/// Circuit breaker and retry policy.
///
/// # Examples
///
/// ```
/// use rollcall_core::BreakerConfig;
///
/// let config = BreakerConfig::default();
/// assert_eq!(config.failure_threshold, 5);
/// assert_eq!(config.cooldown_secs, 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive non-transient failures that open a breaker (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Seconds after the last failure before an open breaker closes (default: 60).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// In-call retries for rate limits and timeouts (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds (default: 250).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds (default: 4000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    250
}

fn default_max_delay_ms() -> u64 {
    4000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Member index location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path (default: `.rollcall/members.db`).
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".rollcall/members.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}
