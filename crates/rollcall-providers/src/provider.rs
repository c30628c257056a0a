//! Call/response contracts for completion and embedding providers.

use async_trait::async_trait;
use rollcall_core::ProviderError;
use serde::{Deserialize, Serialize};

/// A message in a chat conversation with the model.
///
/// # Examples
///
/// ```
/// use rollcall_providers::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("1995 mechanical batch");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use rollcall_providers::Role;
///
/// assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl CompletionRequest {
    /// Request with the given messages and low-temperature defaults.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.1,
            max_tokens: 512,
            stop: Vec::new(),
        }
    }
}

/// Token accounting reported by the provider, when it reports any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Completion text plus optional usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

/// A chat-completion backend.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Name used in logs, breaker bookkeeping and aggregated errors.
    fn name(&self) -> &str;

    /// Run one completion.
    ///
    /// # Errors
    ///
    /// Returns a typed [`ProviderError`]; rate limits and timeouts are
    /// transient, authentication and configuration failures are fatal.
    async fn generate(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;
}

/// A text embedding backend with fixed dimensionality.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every returned vector.
    fn dimensions(&self) -> usize;

    /// Embed `texts`, returning one vector per input in the same order.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DimensionMismatch`] if a vector has the wrong
    /// length, or any other typed provider failure.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}
