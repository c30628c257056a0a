//! SQLite + FTS5 storage for member profiles and embeddings.
//!
//! Profiles live in SQLite with an FTS5 table for keyword search. Each
//! member has one or more embedding variants stored as little-endian `f32`
//! BLOBs; cosine similarity is computed in Rust.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rollcall_core::{Member, RollcallError, SearchFilters};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::backend::{SearchBackend, SearchHit, SearchSource};

/// One embedded view of a member.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVariant {
    /// Variant label, e.g. `profile` or `expertise`.
    pub kind: String,
    pub vector: Vec<f32>,
}

/// Index statistics.
///
/// # Examples
///
/// ```
/// use rollcall_search::store::IndexStats;
///
/// let stats = IndexStats {
///     total_members: 40,
///     total_embeddings: 72,
///     index_size_bytes: 50000,
/// };
/// assert!(stats.total_embeddings >= stats.total_members);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_members: usize,
    pub total_embeddings: usize,
    pub index_size_bytes: u64,
}

/// Texts to embed for a member, labelled by variant.
///
/// Every member gets a `profile` variant; members with skills, services or a
/// designation also get an `expertise` variant.
///
/// # Examples
///
/// ```
/// use rollcall_core::Member;
/// use rollcall_search::store::embedding_texts;
///
/// let member = Member {
///     skills: vec!["Python".into()],
///     city: Some("Chennai".into()),
///     ..Member::new("m1", "Anand Kumar")
/// };
/// let texts = embedding_texts(&member);
/// assert_eq!(texts.len(), 2);
/// assert_eq!(texts[0].0, "profile");
/// assert!(texts[1].1.contains("Python"));
/// ```
pub fn embedding_texts(member: &Member) -> Vec<(&'static str, String)> {
    let mut profile = vec![member.name.clone()];
    if let Some(designation) = &member.designation {
        profile.push(designation.clone());
    }
    if let Some(org) = &member.organization {
        profile.push(format!("at {org}"));
    }
    if let Some(city) = &member.city {
        profile.push(format!("in {city}"));
    }
    if let (Some(year), Some(branch)) = (member.graduation_year, &member.branch) {
        profile.push(format!("{branch} batch of {year}"));
    } else if let Some(year) = member.graduation_year {
        profile.push(format!("batch of {year}"));
    }
    if let Some(bio) = &member.bio {
        profile.push(bio.clone());
    }

    let mut texts = vec![("profile", profile.join(", "))];

    let expertise: Vec<&str> = member
        .designation
        .iter()
        .map(String::as_str)
        .chain(member.skills.iter().map(String::as_str))
        .chain(member.services.iter().map(String::as_str))
        .collect();
    if !expertise.is_empty() {
        texts.push(("expertise", expertise.join(", ")));
    }
    texts
}

/// SHA-256 of a member's serialized profile, used to skip re-embedding
/// unchanged members.
pub fn content_hash(member: &Member) -> String {
    let json = serde_json::to_string(member).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SQLite-based member index with FTS5 keyword search and BLOB-stored
/// embeddings.
///
/// # Examples
///
/// ```
/// use rollcall_search::store::MemberIndex;
///
/// let index = MemberIndex::in_memory().unwrap();
/// let stats = index.stats().unwrap();
/// assert_eq!(stats.total_members, 0);
/// ```
pub struct MemberIndex {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> RollcallError + '_ {
    move |e| RollcallError::Database(format!("{context}: {e}"))
}

impl MemberIndex {
    /// Open or create an index at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Database`] if the directory cannot be
    /// created or the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, RollcallError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RollcallError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path).map_err(db_err("failed to open database"))?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Create an in-memory index.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Database`] if SQLite cannot allocate it.
    pub fn in_memory() -> Result<Self, RollcallError> {
        let conn = Connection::open_in_memory()
            .map_err(db_err("failed to create in-memory database"))?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<(), RollcallError> {
        self.conn()
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS members (
                    num INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    name TEXT NOT NULL,
                    organization TEXT NOT NULL,
                    designation TEXT NOT NULL,
                    skills TEXT NOT NULL,
                    services TEXT NOT NULL,
                    city TEXT NOT NULL,
                    bio TEXT NOT NULL,
                    profile TEXT NOT NULL,
                    content_hash TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS embeddings (
                    member_id TEXT NOT NULL,
                    variant TEXT NOT NULL,
                    vector BLOB NOT NULL,
                    PRIMARY KEY (member_id, variant)
                );

                CREATE VIRTUAL TABLE IF NOT EXISTS members_fts USING fts5(
                    name, organization, designation, skills, services, city, bio,
                    content='members', content_rowid='num'
                );

                CREATE TRIGGER IF NOT EXISTS members_ai AFTER INSERT ON members BEGIN
                    INSERT INTO members_fts(rowid, name, organization, designation, skills, services, city, bio)
                    VALUES (new.num, new.name, new.organization, new.designation, new.skills, new.services, new.city, new.bio);
                END;

                CREATE TRIGGER IF NOT EXISTS members_ad AFTER DELETE ON members BEGIN
                    INSERT INTO members_fts(members_fts, rowid, name, organization, designation, skills, services, city, bio)
                    VALUES ('delete', old.num, old.name, old.organization, old.designation, old.skills, old.services, old.city, old.bio);
                END;
                ",
            )
            .map_err(db_err("failed to create schema"))?;
        Ok(())
    }

    /// Record the embedding dimensionality, or check it against the
    /// recorded value.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Embedding`] if the index was built with a
    /// different dimensionality.
    pub fn set_dimensions(&self, dimensions: usize) -> Result<(), RollcallError> {
        if let Some(stored) = self.dimensions()? {
            if stored != dimensions {
                return Err(RollcallError::Embedding(format!(
                    "index was built with {stored} dimensions but config specifies {dimensions}; \
                     re-import to rebuild"
                )));
            }
            return Ok(());
        }
        self.set_metadata("embedding_dimensions", &dimensions.to_string())
    }

    /// Recorded embedding dimensionality, if any member has been stored.
    pub fn dimensions(&self) -> Result<Option<usize>, RollcallError> {
        match self.metadata("embedding_dimensions")? {
            Some(v) => v.parse().map(Some).map_err(|_| {
                RollcallError::Database(format!("corrupted dimension metadata in index: '{v}'"))
            }),
            None => Ok(None),
        }
    }

    fn metadata(&self, key: &str) -> Result<Option<String>, RollcallError> {
        self.conn()
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RollcallError::Database(format!("failed to get metadata '{key}': {e}")))
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<(), RollcallError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e| RollcallError::Database(format!("failed to set metadata '{key}': {e}")))?;
        Ok(())
    }

    /// Stored content hash for a member, if present.
    pub fn stored_hash(&self, id: &str) -> Result<Option<String>, RollcallError> {
        self.conn()
            .query_row(
                "SELECT content_hash FROM members WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("failed to get member hash"))
    }

    /// Insert or replace a member and all of its embedding variants.
    ///
    /// # Errors
    ///
    /// Returns [`RollcallError::Embedding`] if a variant's length differs
    /// from the recorded dimensionality, or [`RollcallError::Database`] on
    /// storage failure.
    pub fn upsert_member(
        &self,
        member: &Member,
        variants: &[EmbeddingVariant],
    ) -> Result<(), RollcallError> {
        if let Some(first) = variants.first() {
            self.set_dimensions(first.vector.len())?;
        }
        let dims = self.dimensions()?;
        for variant in variants {
            if dims.is_some_and(|d| d != variant.vector.len()) {
                return Err(RollcallError::Embedding(format!(
                    "{} embedding for member {} has {} dimensions, index has {}",
                    variant.kind,
                    member.id,
                    variant.vector.len(),
                    dims.unwrap_or_default()
                )));
            }
        }

        let profile = serde_json::to_string(member)?;
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(db_err("failed to begin transaction"))?;
        tx.execute("DELETE FROM members WHERE id = ?1", params![member.id])
            .map_err(db_err("failed to replace member"))?;
        tx.execute(
            "DELETE FROM embeddings WHERE member_id = ?1",
            params![member.id],
        )
        .map_err(db_err("failed to replace embeddings"))?;
        tx.execute(
            "INSERT INTO members
             (id, name, organization, designation, skills, services, city, bio, profile, content_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                member.id,
                member.name,
                member.organization.as_deref().unwrap_or_default(),
                member.designation.as_deref().unwrap_or_default(),
                member.skills.join(", "),
                member.services.join(", "),
                member.city.as_deref().unwrap_or_default(),
                member.bio.as_deref().unwrap_or_default(),
                profile,
                content_hash(member),
            ],
        )
        .map_err(db_err("failed to insert member"))?;
        for variant in variants {
            tx.execute(
                "INSERT INTO embeddings (member_id, variant, vector) VALUES (?1, ?2, ?3)",
                params![member.id, variant.kind, floats_to_bytes(&variant.vector)],
            )
            .map_err(db_err("failed to insert embedding"))?;
        }
        tx.commit().map_err(db_err("failed to commit member"))?;
        Ok(())
    }

    /// Delete a member; returns `true` if it existed.
    pub fn remove_member(&self, id: &str) -> Result<bool, RollcallError> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .map_err(db_err("failed to begin transaction"))?;
        tx.execute("DELETE FROM embeddings WHERE member_id = ?1", params![id])
            .map_err(db_err("failed to delete embeddings"))?;
        let removed = tx
            .execute("DELETE FROM members WHERE id = ?1", params![id])
            .map_err(db_err("failed to delete member"))?;
        tx.commit().map_err(db_err("failed to commit removal"))?;
        Ok(removed > 0)
    }

    /// Look up one member by id.
    pub fn member(&self, id: &str) -> Result<Option<Member>, RollcallError> {
        let profile: Option<String> = self
            .conn()
            .query_row(
                "SELECT profile FROM members WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err("failed to get member"))?;
        profile
            .map(|p| serde_json::from_str(&p).map_err(RollcallError::from))
            .transpose()
    }

    pub fn stats(&self) -> Result<IndexStats, RollcallError> {
        let conn = self.conn();
        let total_members: i64 = conn
            .query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))
            .map_err(db_err("failed to count members"))?;
        let total_embeddings: i64 = conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(db_err("failed to count embeddings"))?;
        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(IndexStats {
            total_members: total_members as usize,
            total_embeddings: total_embeddings as usize,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }

    /// Synchronous vector search; see [`SearchBackend::vector_search`].
    pub fn search_vectors(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RollcallError> {
        if let Some(dims) = self.dimensions()? {
            if dims != vector.len() {
                return Err(RollcallError::Embedding(format!(
                    "query embedding has {} dimensions, index has {dims}",
                    vector.len()
                )));
            }
        }

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT m.id, m.profile, e.vector
                 FROM embeddings e JOIN members m ON m.id = e.member_id",
            )
            .map_err(db_err("failed to prepare vector query"))?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let profile: String = row.get(1)?;
                let bytes: Vec<u8> = row.get(2)?;
                Ok((id, profile, cosine_similarity(vector, &bytes_to_floats(&bytes))))
            })
            .map_err(db_err("failed to query embeddings"))?;

        let mut best: HashMap<String, (String, f64)> = HashMap::new();
        for row in rows {
            let (id, profile, score) = row.map_err(db_err("failed to read embedding row"))?;
            let entry = best.entry(id).or_insert((profile, f64::MIN));
            if score > entry.1 {
                entry.1 = score;
            }
        }

        let mut hits = Vec::new();
        for (_, (profile, score)) in best {
            let member: Member = serde_json::from_str(&profile)?;
            if let Some(matched_fields) = filters.evaluate(&member) {
                hits.push(SearchHit {
                    member,
                    score: score.clamp(0.0, 1.0),
                    source: SearchSource::Vector,
                    matched_fields,
                });
            }
        }
        sort_hits(&mut hits);
        hits.truncate(limit);
        debug!(hits = hits.len(), "vector search");
        Ok(hits)
    }

    /// Synchronous keyword search; see [`SearchBackend::keyword_search`].
    pub fn search_keywords(
        &self,
        phrase: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<SearchHit>, RollcallError> {
        let safe_query = sanitize_fts_query(phrase);
        if safe_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT m.profile, rank
                 FROM members_fts f
                 JOIN members m ON m.num = f.rowid
                 WHERE members_fts MATCH ?1
                 ORDER BY rank",
            )
            .map_err(db_err("failed to prepare FTS query"))?;
        let rows = stmt
            .query_map(params![safe_query], |row| {
                let profile: String = row.get(0)?;
                let rank: f64 = row.get(1)?;
                // bm25 rank is negative; more negative is more relevant
                Ok((profile, (-rank).max(0.0)))
            })
            .map_err(db_err("FTS query failed"))?;

        let mut hits = Vec::new();
        for row in rows {
            let (profile, raw) = row.map_err(db_err("failed to read FTS row"))?;
            let member: Member = serde_json::from_str(&profile)?;
            if let Some(matched_fields) = filters.evaluate(&member) {
                hits.push(SearchHit {
                    member,
                    score: raw,
                    source: SearchSource::Keyword,
                    matched_fields,
                });
            }
        }

        let top = hits.iter().map(|h| h.score).fold(0.0f64, f64::max);
        for hit in &mut hits {
            hit.score = if top > 0.0 { hit.score / top } else { 1.0 };
        }
        sort_hits(&mut hits);
        hits.truncate(limit);
        debug!(hits = hits.len(), query = %safe_query, "keyword search");
        Ok(hits)
    }
}

#[async_trait]
impl SearchBackend for MemberIndex {
    async fn vector_search(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        limit: usize,
    ) -> rollcall_core::Result<Vec<SearchHit>> {
        self.search_vectors(vector, filters, limit)
    }

    async fn keyword_search(
        &self,
        phrase: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> rollcall_core::Result<Vec<SearchHit>> {
        self.search_keywords(phrase, filters, limit)
    }
}

fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.member.id.cmp(&b.member.id))
    });
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    floats.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}
