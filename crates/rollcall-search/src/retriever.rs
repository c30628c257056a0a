//! Hybrid retrieval: vector + lexical search merged by weighted score, with
//! an exact-match override for named-person lookups.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use rollcall_core::names::{exact_match, looks_like_person_name, MatchKind};
use rollcall_core::{
    Pagination, ScoredMember, SearchConfig, SearchFilters, SortField, SortOrder,
};
use rollcall_providers::ProviderFactory;
use serde::Serialize;
use tracing::debug;

use crate::backend::{SearchBackend, SearchHit};
use crate::clean::clean_query;

/// One retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalRequest {
    pub phrase: String,
    pub filters: SearchFilters,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based page number.
    pub page: usize,
    pub per_page: usize,
}

impl RetrievalRequest {
    /// Relevance-ordered first page of ten.
    pub fn new(phrase: impl Into<String>, filters: SearchFilters) -> Self {
        Self {
            phrase: phrase.into(),
            filters,
            sort: SortField::Relevance,
            order: SortOrder::Desc,
            page: 1,
            per_page: 10,
        }
    }

    pub fn with_sort(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }
}

/// A page of ranked members.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrieval {
    pub members: Vec<ScoredMember>,
    pub pagination: Pagination,
    /// The phrase actually searched, after filler removal.
    pub cleaned_query: String,
    /// Whether the bare-name narrowing was applied.
    pub person_filter: bool,
}

/// Runs both search paths concurrently and merges them.
pub struct HybridRetriever {
    backend: Arc<dyn SearchBackend>,
    factory: Arc<ProviderFactory>,
    config: SearchConfig,
}

struct Candidate {
    scored: ScoredMember,
    base_score: f64,
    exact: Option<MatchKind>,
}

impl HybridRetriever {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        factory: Arc<ProviderFactory>,
        config: SearchConfig,
    ) -> Self {
        Self {
            backend,
            factory,
            config,
        }
    }

    /// Retrieve, rank and paginate members for `request`.
    ///
    /// # Errors
    ///
    /// Embedding and storage failures propagate unchanged; there is no
    /// lexical-only fallback.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> rollcall_core::Result<Retrieval> {
        let cleaned = clean_query(&request.phrase);
        if cleaned.is_empty() {
            return Ok(Retrieval {
                members: Vec::new(),
                pagination: Pagination::new(request.page, request.per_page, 0),
                cleaned_query: cleaned,
                person_filter: false,
            });
        }

        let limit = self.config.candidate_limit;
        let semantic = async {
            let vector = self.factory.embed_one(&cleaned).await?;
            self.backend
                .vector_search(&vector, &request.filters, limit)
                .await
        };
        let lexical = self
            .backend
            .keyword_search(&cleaned, &request.filters, limit);
        let (semantic, lexical) = tokio::join!(semantic, lexical);
        let (semantic, lexical) = (semantic?, lexical?);
        debug!(
            semantic = semantic.len(),
            lexical = lexical.len(),
            query = %cleaned,
            "search paths returned"
        );

        let mut candidates = self.merge(semantic, lexical);
        for candidate in &mut candidates {
            let member = &candidate.scored.member;
            candidate.exact = exact_match(
                &cleaned,
                &member.name,
                member.email.as_deref(),
                member.phone.as_deref(),
            );
            if candidate.exact.is_some() {
                candidate.scored.relevance_score = 1.0;
                candidate.scored.is_exact_match = true;
            }
        }

        let person_filter = looks_like_person_name(&cleaned);
        if person_filter {
            candidates = narrow_to_person(candidates, cleaned.split_whitespace().count() == 1);
            debug!(remaining = candidates.len(), "person filter applied");
        }

        let mut ranked: Vec<ScoredMember> = candidates.into_iter().map(|c| c.scored).collect();
        sort_members(&mut ranked, request.sort, request.order);

        let pagination = Pagination::new(request.page, request.per_page, ranked.len());
        let members = ranked[pagination.bounds()].to_vec();
        Ok(Retrieval {
            members,
            pagination,
            cleaned_query: cleaned,
            person_filter,
        })
    }

    fn merge(&self, semantic: Vec<SearchHit>, lexical: Vec<SearchHit>) -> Vec<Candidate> {
        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, ScoredMember> = HashMap::new();

        for (hit, is_semantic) in semantic
            .into_iter()
            .map(|h| (h, true))
            .chain(lexical.into_iter().map(|h| (h, false)))
        {
            let entry = by_id.entry(hit.member.id.clone()).or_insert_with(|| {
                order.push(hit.member.id.clone());
                ScoredMember {
                    member: hit.member.clone(),
                    semantic_score: 0.0,
                    keyword_score: 0.0,
                    relevance_score: 0.0,
                    is_exact_match: false,
                    matched_fields: Vec::new(),
                }
            });
            entry.member = hit.member;
            if is_semantic {
                entry.semantic_score = entry.semantic_score.max(hit.score);
            } else {
                entry.keyword_score = entry.keyword_score.max(hit.score);
            }
            for field in hit.matched_fields {
                if !entry.matched_fields.contains(&field) {
                    entry.matched_fields.push(field);
                }
            }
        }

        order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .map(|mut scored| {
                let base_score = self.config.semantic_weight * scored.semantic_score
                    + self.config.keyword_weight * scored.keyword_score;
                scored.relevance_score = base_score;
                Candidate {
                    scored,
                    base_score,
                    exact: None,
                }
            })
            .collect()
    }
}

fn by_base_score(a: &Candidate, b: &Candidate) -> Ordering {
    b.base_score
        .partial_cmp(&a.base_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.scored.member.id.cmp(&b.scored.member.id))
}

/// Bare-name narrowing: full matches if any, else the best first/last-token
/// match for a one-word query (none if no name carries the token), else the
/// single best candidate.
fn narrow_to_person(mut candidates: Vec<Candidate>, single_token: bool) -> Vec<Candidate> {
    if candidates
        .iter()
        .any(|c| c.exact == Some(MatchKind::Full))
    {
        candidates.retain(|c| c.exact == Some(MatchKind::Full));
        return candidates;
    }
    if single_token {
        candidates.retain(|c| c.exact == Some(MatchKind::Token));
    }
    candidates.sort_by(by_base_score);
    candidates.truncate(1);
    candidates
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn missing_last<T>(
    a: Option<T>,
    b: Option<T>,
    order: SortOrder,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(cmp(&x, &y), order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn total(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Exact matches first; then `field` in `order`; ties by relevance, name
/// and id. Members missing the sort value go last.
///
/// # Examples
///
/// ```
/// use rollcall_core::{Member, ScoredMember, SortField, SortOrder};
/// use rollcall_search::sort_members;
///
/// let scored = |id: &str, year: Option<i32>| ScoredMember {
///     member: Member { graduation_year: year, ..Member::new(id, id) },
///     semantic_score: 0.0,
///     keyword_score: 0.0,
///     relevance_score: 0.5,
///     is_exact_match: false,
///     matched_fields: vec![],
/// };
/// let mut members = vec![scored("a", None), scored("b", Some(1990)), scored("c", Some(2001))];
/// sort_members(&mut members, SortField::Year, SortOrder::Asc);
/// let ids: Vec<_> = members.iter().map(|m| m.member.id.as_str()).collect();
/// assert_eq!(ids, ["b", "c", "a"]);
/// ```
pub fn sort_members(members: &mut [ScoredMember], field: SortField, order: SortOrder) {
    members.sort_by(|a, b| {
        b.is_exact_match
            .cmp(&a.is_exact_match)
            .then_with(|| match field {
                SortField::Relevance => {
                    directed(total(&a.relevance_score, &b.relevance_score), order)
                }
                SortField::Name => directed(
                    a.member.name.to_lowercase().cmp(&b.member.name.to_lowercase()),
                    order,
                ),
                SortField::Year => missing_last(
                    a.member.graduation_year,
                    b.member.graduation_year,
                    order,
                    i32::cmp,
                ),
                SortField::Turnover => missing_last(
                    a.member.annual_turnover,
                    b.member.annual_turnover,
                    order,
                    total,
                ),
            })
            .then_with(|| total(&b.relevance_score, &a.relevance_score))
            .then_with(|| a.member.name.to_lowercase().cmp(&b.member.name.to_lowercase()))
            .then_with(|| a.member.id.cmp(&b.member.id))
    });
}
