//! The storage seam the retriever searches through.

use async_trait::async_trait;
use rollcall_core::{Member, SearchFilters};
use serde::{Deserialize, Serialize};

/// A member returned by one search path.
///
/// # Examples
///
/// ```
/// use rollcall_core::Member;
/// use rollcall_search::backend::{SearchHit, SearchSource};
///
/// let hit = SearchHit {
///     member: Member::new("m1", "Anand Kumar"),
///     score: 0.82,
///     source: SearchSource::Vector,
///     matched_fields: vec!["location".into()],
/// };
/// assert!(hit.score > 0.8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub member: Member,
    /// Similarity or normalized lexical relevance in `[0, 1]`.
    pub score: f64,
    pub source: SearchSource,
    /// Filter dimensions the member satisfied.
    pub matched_fields: Vec<String>,
}

/// Which path produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Vector,
    Keyword,
}

/// Vector-similarity and lexical search over a member corpus.
///
/// Both operations must honour every predicate of [`SearchFilters`] and
/// return hits ordered best first.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Members ranked by `1 - cosine distance` to `vector`, best embedding
    /// variant per member.
    async fn vector_search(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> rollcall_core::Result<Vec<SearchHit>>;

    /// Members ranked by full-text relevance, normalized so the best hit
    /// scores 1.0.
    async fn keyword_search(
        &self,
        phrase: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> rollcall_core::Result<Vec<SearchHit>>;
}
