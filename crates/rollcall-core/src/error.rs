use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur across the Rollcall pipeline.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary renders it through `miette` at the boundary.
///
/// # Examples
///
/// ```
/// use rollcall_core::RollcallError;
///
/// let err = RollcallError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RollcallError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A provider reply could not be turned into a valid extraction.
    #[error("parse error: {0}")]
    Parse(String),

    /// A single provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Every configured provider failed or was skipped by its breaker.
    #[error("all {operation} providers failed: {}", format_failures(.failures))]
    #[diagnostic(help("check provider API keys, base URLs and network access"))]
    ProvidersExhausted {
        /// Which provider family was being called (`completion` or `embedding`).
        operation: String,
        /// Provider name and failure reason, in call order.
        failures: Vec<ProviderFailure>,
    },

    /// Member index failure.
    #[error("database error: {0}")]
    Database(String),

    /// Embedding shape or content failure outside a provider call.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

/// One entry of an aggregated provider failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Configured provider name.
    pub provider: String,
    /// Human-readable failure reason.
    pub reason: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".into();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Typed failure from a completion or embedding provider.
///
/// Rate limits and timeouts are transient and worth retrying; authentication
/// and configuration failures are fatal for the provider that raised them.
///
/// # Examples
///
/// ```
/// use rollcall_core::ProviderError;
///
/// let err = ProviderError::Timeout { provider: "openai".into() };
/// assert!(err.is_transient());
/// assert!(!err.is_fatal());
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// HTTP 429 or an equivalent provider signal.
    #[error("{provider}: rate limited")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    /// The call exceeded its deadline.
    #[error("{provider}: request timed out")]
    Timeout { provider: String },

    /// Credentials were rejected (401/403).
    #[error("{provider}: authentication failed: {message}")]
    Auth { provider: String, message: String },

    /// The provider is not usable as configured (e.g. no API key).
    #[error("{provider}: misconfigured: {message}")]
    Configuration { provider: String, message: String },

    /// Any other non-success HTTP status or transport failure.
    #[error("{provider}: HTTP {status}: {message}")]
    Http {
        provider: String,
        status: u16,
        message: String,
    },

    /// The provider answered, but not in the expected shape.
    #[error("{provider}: invalid response: {message}")]
    InvalidResponse { provider: String, message: String },

    /// An embedding had the wrong number of dimensions.
    #[error("{provider}: expected {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch {
        provider: String,
        expected: usize,
        actual: usize,
    },
}

impl ProviderError {
    /// Rate-limit and timeout failures: retried and never counted by breakers.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Timeout { .. })
    }

    /// Authentication and configuration failures: never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. } | Self::Configuration { .. })
    }

    /// The failure without the provider prefix, for aggregated reports.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_core::ProviderError;
    ///
    /// let err = ProviderError::Http {
    ///     provider: "groq".into(),
    ///     status: 500,
    ///     message: "boom".into(),
    /// };
    /// assert_eq!(err.reason(), "HTTP 500: boom");
    /// ```
    pub fn reason(&self) -> String {
        match self {
            Self::RateLimited { .. } => "rate limited".into(),
            Self::Timeout { .. } => "request timed out".into(),
            Self::Auth { message, .. } => format!("authentication failed: {message}"),
            Self::Configuration { message, .. } => format!("misconfigured: {message}"),
            Self::Http {
                status, message, ..
            } => format!("HTTP {status}: {message}"),
            Self::InvalidResponse { message, .. } => format!("invalid response: {message}"),
            Self::DimensionMismatch {
                expected, actual, ..
            } => format!("expected {expected}-dimensional embedding, got {actual}"),
        }
    }

    /// Name of the provider that produced this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimited { provider, .. }
            | Self::Timeout { provider }
            | Self::Auth { provider, .. }
            | Self::Configuration { provider, .. }
            | Self::Http { provider, .. }
            | Self::InvalidResponse { provider, .. }
            | Self::DimensionMismatch { provider, .. } => provider,
        }
    }
}
