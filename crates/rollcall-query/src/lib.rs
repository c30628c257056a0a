//! The Rollcall query pipeline.
//!
//! [`QueryPipeline`] classifies a natural-language query, extracts
//! structured filters, runs hybrid retrieval and returns a
//! [`QueryResponse`] with ranked members and follow-up suggestions.

pub mod format;
pub mod pipeline;
pub mod session;
pub mod suggest;

pub use format::render;
pub use pipeline::{QueryOptions, QueryPipeline, QueryResponse, Understanding};
pub use session::{InMemorySessionStore, SessionStore};
