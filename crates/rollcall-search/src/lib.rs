//! Member storage and hybrid retrieval.
//!
//! [`MemberIndex`] stores profiles in SQLite with FTS5 and embedding BLOBs;
//! [`HybridRetriever`] runs vector and keyword search against any
//! [`SearchBackend`], merges them by weighted score and applies the
//! exact-match override.

pub mod backend;
mod clean;
pub mod retriever;
pub mod store;

pub use backend::{SearchBackend, SearchHit, SearchSource};
pub use clean::clean_query;
pub use retriever::{sort_members, HybridRetriever, Retrieval, RetrievalRequest};
pub use store::{embedding_texts, EmbeddingVariant, IndexStats, MemberIndex};
