//! Query understanding for Rollcall.
//!
//! Classifies a query's intent, extracts structured entities with regex
//! patterns, and falls back to a completion provider when the patterns are
//! not confident enough. [`build_filters`] turns the result into retrieval
//! constraints.

pub mod filters;
pub mod generative;
pub mod hybrid;
pub mod intent;
pub mod prompt;
pub mod regex_extract;

pub use filters::build_filters;
pub use generative::GenerativeExtractor;
pub use hybrid::{
    fallback_reason, merge_entities, merge_intent, ExtractionStage, FallbackReason,
    HybridExtractor, HybridOutcome,
};
pub use intent::IntentClassifier;
pub use prompt::{GenerativeExtraction, ParsedReply};
pub use regex_extract::{EntityFamily, RegexExtraction, RegexExtractor};
