//! Conversation state kept outside the pipeline.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rollcall_core::{ExtractionResult, IntentResult};
use serde::{Deserialize, Serialize};

/// Extraction output worth reusing for an identical query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedExtraction {
    pub intent: IntentResult,
    pub extraction: ExtractionResult,
}

/// One answered query in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub query: String,
    /// One-line description of what was returned.
    pub summary: String,
}

/// Per-session conversation memory and an extraction cache.
pub trait SessionStore: Send + Sync {
    /// Conversation summary to pass as extraction context, if any turns
    /// were recorded.
    fn context(&self, session: &str) -> Option<String>;

    fn record_turn(&self, session: &str, turn: Turn);

    fn cached_extraction(&self, key: &str) -> Option<CachedExtraction>;

    fn cache_extraction(&self, key: String, value: CachedExtraction);
}

/// Cache key: the query lower-cased with whitespace collapsed, plus context.
///
/// # Examples
///
/// ```
/// use rollcall_query::session::cache_key;
///
/// assert_eq!(cache_key("  Python   devs ", None), cache_key("python devs", None));
/// assert_ne!(cache_key("python devs", Some("chennai")), cache_key("python devs", None));
/// ```
pub fn cache_key(query: &str, context: Option<&str>) -> String {
    let normalize = |s: &str| {
        s.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    };
    match context {
        Some(ctx) => format!("{}\u{1f}{}", normalize(query), normalize(ctx)),
        None => normalize(query),
    }
}

/// [`SessionStore`] held in process memory.
///
/// Keeps the last `max_turns` turns per session and at most `capacity`
/// cached extractions, evicting the oldest insert first.
///
/// # Examples
///
/// ```
/// use rollcall_query::session::{InMemorySessionStore, SessionStore, Turn};
///
/// let store = InMemorySessionStore::new(3, 16);
/// assert!(store.context("s1").is_none());
/// store.record_turn("s1", Turn { query: "caterers in madurai".into(), summary: "2 members".into() });
/// assert!(store.context("s1").unwrap().contains("caterers in madurai"));
/// ```
#[derive(Debug)]
pub struct InMemorySessionStore {
    max_turns: usize,
    capacity: usize,
    turns: Mutex<HashMap<String, VecDeque<Turn>>>,
    cache: Mutex<Cache>,
}

#[derive(Debug, Default)]
struct Cache {
    entries: HashMap<String, CachedExtraction>,
    order: VecDeque<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemorySessionStore {
    pub fn new(max_turns: usize, capacity: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            capacity,
            turns: Mutex::new(HashMap::new()),
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn cached_len(&self) -> usize {
        lock(&self.cache).entries.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(5, 256)
    }
}

impl SessionStore for InMemorySessionStore {
    fn context(&self, session: &str) -> Option<String> {
        let turns = lock(&self.turns);
        let history = turns.get(session).filter(|t| !t.is_empty())?;
        let lines: Vec<String> = history
            .iter()
            .map(|t| format!("User asked: {} -> {}", t.query, t.summary))
            .collect();
        Some(lines.join("\n"))
    }

    fn record_turn(&self, session: &str, turn: Turn) {
        let mut turns = lock(&self.turns);
        let history = turns.entry(session.to_string()).or_default();
        history.push_back(turn);
        while history.len() > self.max_turns {
            history.pop_front();
        }
    }

    fn cached_extraction(&self, key: &str) -> Option<CachedExtraction> {
        lock(&self.cache).entries.get(key).cloned()
    }

    fn cache_extraction(&self, key: String, value: CachedExtraction) {
        if self.capacity == 0 {
            return;
        }
        let mut cache = lock(&self.cache);
        if cache.entries.insert(key.clone(), value).is_none() {
            cache.order.push_back(key);
        }
        while cache.entries.len() > self.capacity {
            match cache.order.pop_front() {
                Some(oldest) => {
                    cache.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{ExtractedEntities, ExtractionMethod, Intent};

    fn cached(confidence: f64) -> CachedExtraction {
        CachedExtraction {
            intent: IntentResult {
                primary: Intent::FindPeers,
                secondary: None,
                confidence,
                matched_patterns: vec![],
            },
            extraction: ExtractionResult {
                entities: ExtractedEntities::default(),
                confidence,
                method: ExtractionMethod::Regex,
                elapsed_ms: 1,
                provenance: Default::default(),
                search_query: None,
            },
        }
    }

    #[test]
    fn turns_are_bounded() {
        let store = InMemorySessionStore::new(2, 4);
        for q in ["a", "b", "c"] {
            store.record_turn(
                "s",
                Turn {
                    query: q.into(),
                    summary: "none".into(),
                },
            );
        }
        let context = store.context("s").unwrap();
        assert!(!context.contains("asked: a "));
        assert!(context.contains("asked: b "));
        assert!(context.contains("asked: c "));
        assert!(store.context("other").is_none());
    }

    #[test]
    fn cache_evicts_oldest_insert() {
        let store = InMemorySessionStore::new(2, 2);
        store.cache_extraction("k1".into(), cached(0.1));
        store.cache_extraction("k2".into(), cached(0.2));
        store.cache_extraction("k1".into(), cached(0.3));
        assert_eq!(store.cached_len(), 2);
        store.cache_extraction("k3".into(), cached(0.4));

        assert_eq!(store.cached_len(), 2);
        assert!(store.cached_extraction("k1").is_none());
        assert_eq!(
            store.cached_extraction("k2").unwrap().extraction.confidence,
            0.2
        );
        assert!(store.cached_extraction("k3").is_some());
    }

    #[test]
    fn zero_capacity_disables_cache() {
        let store = InMemorySessionStore::new(1, 0);
        store.cache_extraction("k".into(), cached(0.5));
        assert!(store.cached_extraction("k").is_none());
    }
}
