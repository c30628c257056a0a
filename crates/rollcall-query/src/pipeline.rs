use std::sync::Arc;
use std::time::Instant;

use rollcall_core::{
    ExtractedEntities, ExtractionMethod, ExtractionResult, Intent, IntentResult, Pagination,
    RollcallConfig, ScoredMember, SearchFilters, SortField, SortOrder,
};
use rollcall_extract::{build_filters, FallbackReason, GenerativeExtractor, HybridExtractor};
use rollcall_providers::ProviderFactory;
use rollcall_search::{HybridRetriever, RetrievalRequest, SearchBackend};
use serde::Serialize;
use tracing::{debug, info};

use crate::session::{cache_key, CachedExtraction, InMemorySessionStore, SessionStore, Turn};
use crate::suggest::suggest;

/// Everything the caller gets back for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub query: String,
    pub intent: IntentResult,
    pub entities: ExtractedEntities,
    /// Extraction confidence.
    pub confidence: f64,
    pub method: ExtractionMethod,
    /// Why the generative path was entered, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
    pub filters: SearchFilters,
    pub members: Vec<ScoredMember>,
    pub pagination: Pagination,
    pub suggestions: Vec<String>,
}

/// Paging, ordering and conversation options for [`QueryPipeline::search_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    pub max_results: usize,
    /// 1-based.
    pub page: usize,
    pub sort: SortField,
    pub order: SortOrder,
    /// Conversation context; overrides the session's stored context.
    pub context: Option<String>,
    /// Session id for context lookup and turn recording.
    pub session: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            max_results: 10,
            page: 1,
            sort: SortField::Relevance,
            order: SortOrder::Desc,
            context: None,
            session: None,
        }
    }
}

/// Intent and entities for a query, however they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Understanding {
    pub intent: IntentResult,
    pub extraction: ExtractionResult,
    pub fallback: Option<FallbackReason>,
}

/// Query understanding followed by hybrid retrieval.
///
/// Stateless apart from the optional [`SessionStore`].
pub struct QueryPipeline {
    extractor: HybridExtractor,
    retriever: HybridRetriever,
    sessions: Option<Arc<dyn SessionStore>>,
}

impl QueryPipeline {
    pub fn new(extractor: HybridExtractor, retriever: HybridRetriever) -> Self {
        Self {
            extractor,
            retriever,
            sessions: None,
        }
    }

    /// Wire a pipeline from configuration, a provider factory and a search
    /// backend, with an in-memory session store sized by
    /// `extraction.cache_capacity`.
    pub fn from_config(
        config: &RollcallConfig,
        factory: Arc<ProviderFactory>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        let regex_only = HybridExtractor::regex_only(config.extraction.clone());
        let current_year = regex_only.regex().current_year();
        let generative = factory
            .has_text_providers()
            .then(|| GenerativeExtractor::new(factory.clone(), &config.llm, current_year));
        let extractor = HybridExtractor::new(generative, config.extraction.clone());
        let retriever = HybridRetriever::new(backend, factory, config.search.clone());
        let sessions = InMemorySessionStore::new(5, config.extraction.cache_capacity);
        Self::new(extractor, retriever).with_sessions(Arc::new(sessions))
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn extractor(&self) -> &HybridExtractor {
        &self.extractor
    }

    /// Classify and extract, reusing a cached extraction when the session
    /// store has one for the same query and context.
    pub async fn understand(&self, query: &str, context: Option<&str>) -> Understanding {
        let key = cache_key(query, context);
        if let Some(cached) = self
            .sessions
            .as_ref()
            .and_then(|s| s.cached_extraction(&key))
        {
            debug!(%key, "extraction cache hit");
            return Understanding {
                intent: cached.intent,
                extraction: ExtractionResult {
                    method: ExtractionMethod::Cached,
                    elapsed_ms: 0,
                    ..cached.extraction
                },
                fallback: None,
            };
        }

        let outcome = self.extractor.extract(query, context).await;
        if let Some(sessions) = &self.sessions {
            sessions.cache_extraction(
                key,
                CachedExtraction {
                    intent: outcome.intent.clone(),
                    extraction: outcome.extraction.clone(),
                },
            );
        }
        Understanding {
            intent: outcome.intent,
            extraction: outcome.extraction,
            fallback: outcome.fallback,
        }
    }

    /// Answer a natural-language query.
    ///
    /// # Errors
    ///
    /// Retrieval failures (storage, embedding) propagate. Extraction never
    /// fails the call.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        context: Option<&str>,
    ) -> rollcall_core::Result<QueryResponse> {
        let options = QueryOptions {
            max_results,
            context: context.map(str::to_string),
            ..QueryOptions::default()
        };
        self.search_with(query, &options).await
    }

    /// [`QueryPipeline::search`] with paging, ordering and session options.
    ///
    /// # Errors
    ///
    /// Same as [`QueryPipeline::search`].
    pub async fn search_with(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> rollcall_core::Result<QueryResponse> {
        let started = Instant::now();
        let query = query.trim();
        let stored_context = match (&options.context, &options.session, &self.sessions) {
            (None, Some(session), Some(sessions)) => sessions.context(session),
            _ => None,
        };
        let context = options.context.as_deref().or(stored_context.as_deref());

        let understanding = if query.is_empty() {
            Understanding {
                intent: self.extractor.classifier().classify(query),
                extraction: ExtractionResult {
                    entities: ExtractedEntities::default(),
                    confidence: 0.0,
                    method: ExtractionMethod::Regex,
                    elapsed_ms: 0,
                    provenance: Default::default(),
                    search_query: None,
                },
                fallback: None,
            }
        } else {
            self.understand(query, context).await
        };

        let entities = understanding.extraction.entities.clone();
        let filters = build_filters(&entities);
        let phrase = search_phrase(query, &understanding);
        let request = RetrievalRequest::new(phrase, filters.clone())
            .with_sort(options.sort, options.order)
            .with_page(options.page, options.max_results.max(1));
        let retrieval = self.retriever.retrieve(&request).await?;

        let suggestions = suggest(
            understanding.intent.primary,
            &entities,
            &retrieval.members,
            &retrieval.cleaned_query,
        );

        info!(
            intent = %understanding.intent.primary,
            method = %understanding.extraction.method,
            results = retrieval.pagination.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query answered"
        );

        let response = QueryResponse {
            query: query.to_string(),
            intent: understanding.intent,
            entities,
            confidence: understanding.extraction.confidence,
            method: understanding.extraction.method,
            fallback: understanding.fallback,
            filters,
            members: retrieval.members,
            pagination: retrieval.pagination,
            suggestions,
        };

        if let (Some(session), Some(sessions)) = (&options.session, &self.sessions) {
            sessions.record_turn(
                session,
                Turn {
                    query: response.query.clone(),
                    summary: turn_summary(&response),
                },
            );
        }
        Ok(response)
    }
}

/// The phrase handed to retrieval: the extracted name for person lookups,
/// else the generative search phrase, else the query itself.
fn search_phrase(query: &str, understanding: &Understanding) -> String {
    let extraction = &understanding.extraction;
    if understanding.intent.primary == Intent::FindSpecificPerson {
        let name = extraction.entities.name.as_deref();
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            return name.to_string();
        }
    }
    extraction
        .search_query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(query)
        .to_string()
}

fn turn_summary(response: &QueryResponse) -> String {
    let names: Vec<&str> = response
        .members
        .iter()
        .take(3)
        .map(|m| m.member.name.as_str())
        .collect();
    if names.is_empty() {
        format!("no {} results", response.intent.primary)
    } else {
        format!(
            "{} {} results, top: {}",
            response.pagination.total,
            response.intent.primary,
            names.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn understanding(intent: Intent, name: Option<&str>, search: Option<&str>) -> Understanding {
        Understanding {
            intent: IntentResult {
                primary: intent,
                secondary: None,
                confidence: 0.9,
                matched_patterns: vec![],
            },
            extraction: ExtractionResult {
                entities: ExtractedEntities {
                    name: name.map(str::to_string),
                    ..Default::default()
                },
                confidence: 0.9,
                method: ExtractionMethod::Hybrid,
                elapsed_ms: 3,
                provenance: BTreeMap::new(),
                search_query: search.map(str::to_string),
            },
            fallback: None,
        }
    }

    #[test]
    fn person_lookups_search_by_name() {
        let u = understanding(Intent::FindSpecificPerson, Some("Fatima Mary"), Some("fatima"));
        assert_eq!(search_phrase("phone number of fatima mary", &u), "Fatima Mary");
    }

    #[test]
    fn generative_phrase_beats_raw_query() {
        let u = understanding(Intent::FindBusiness, None, Some("catering madurai"));
        assert_eq!(search_phrase("need someone to cater in madurai", &u), "catering madurai");
        let u = understanding(Intent::FindBusiness, None, Some("  "));
        assert_eq!(search_phrase("caterers", &u), "caterers");
    }
}
