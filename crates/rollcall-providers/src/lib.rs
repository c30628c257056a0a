//! Completion and embedding providers for Rollcall.
//!
//! Provides the provider traits, OpenAI-compatible HTTP clients, per-provider
//! circuit breakers, and the [`ProviderFactory`] that fails over between them.

pub mod breaker;
pub mod embedding;
pub mod factory;
pub mod llm;
pub mod provider;

pub use breaker::{BreakerPolicy, CircuitState, Clock, ManualClock, SystemClock};
pub use embedding::EmbeddingClient;
pub use factory::{ProviderFactory, RetryPolicy};
pub use llm::CompletionClient;
pub use provider::{
    ChatMessage, Completion, CompletionRequest, EmbeddingProvider, Role, TextProvider, Usage,
};
