//! Core types, configuration, and error handling for Rollcall.
//!
//! This crate provides the shared foundation used by all other Rollcall crates:
//! - [`RollcallError`] — unified error type using `thiserror`
//! - [`RollcallConfig`] — configuration loaded from `.rollcall.toml`
//! - Shared types: [`Intent`], [`ExtractedEntities`], [`SearchFilters`],
//!   [`Member`], [`ScoredMember`], [`Pagination`], [`OutputFormat`]
//! - [`patterns`] — normalization tables and keyword sets
//! - [`names`] — name, email and phone normalization

mod config;
mod error;
pub mod names;
pub mod patterns;
mod types;

pub use config::{
    BreakerConfig, EmbeddingConfig, ExtractionConfig, LlmConfig, ProviderConfig, RollcallConfig,
    SearchConfig, StoreConfig,
};
pub use error::{ProviderError, ProviderFailure, RollcallError};
pub use types::{
    ExtractedEntities, ExtractionMethod, ExtractionResult, FieldSource, Intent, IntentResult,
    Member, OutputFormat, Pagination, ScoredMember, SearchFilters, SortField, SortOrder,
    TurnoverBounds, TurnoverTier, YearRange,
};

/// A convenience `Result` type for Rollcall operations.
pub type Result<T> = std::result::Result<T, RollcallError>;
