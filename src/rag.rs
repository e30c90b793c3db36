//! RAG activation gate and memory service contract (C11, §6).
//!
//! The vector store and document ingestion pipeline are out of scope (§1):
//! this module defines the narrow `MemoryService` interface the router
//! talks to, an in-memory reference implementation for tests, and an
//! optional sqlite-backed one (feature `sqlite-memory`) grounded on the
//! teacher's `memory/sqlite.rs` repository shape, minus its vector-search
//! extension since embeddings are out of scope here.

use crate::classifier::QueryComplexity;
use crate::config::RagConfig;
use crate::error::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

/// RAG activation level, derived from query text patterns (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RagLevel {
    Disabled,
    Minimal,
    Standard,
    Comprehensive,
}

impl RagLevel {
    /// Promote one tier (×1.3 amplification, §4.11), ceiling at `Comprehensive`.
    #[must_use]
    fn promote(self) -> Self {
        match self {
            Self::Disabled => Self::Minimal,
            Self::Minimal => Self::Standard,
            Self::Standard | Self::Comprehensive => Self::Comprehensive,
        }
    }

    /// Demote one tier (×0.5 attenuation, §4.11), floor at `Disabled`.
    #[must_use]
    fn demote(self) -> Self {
        match self {
            Self::Comprehensive => Self::Standard,
            Self::Standard => Self::Minimal,
            Self::Minimal | Self::Disabled => Self::Disabled,
        }
    }
}

/// A RAG query produced from user text (§3).
#[derive(Debug, Clone)]
pub struct RagQuery {
    pub original: String,
    pub processed: String,
    pub level: RagLevel,
    pub keywords: Vec<String>,
    pub confidence: f32,
}

/// One search hit returned by the memory service.
#[derive(Debug, Clone)]
pub struct MemoryHit {
    pub content: String,
    pub score: f32,
    pub source: String,
    pub metadata: HashMap<String, String>,
}

/// Long-term memory / RAG store contract (§6). All operations are async,
/// idempotent on effect where meaningful, and may fail without affecting
/// conversation continuity (the caller proceeds without RAG content).
#[async_trait]
pub trait MemoryService: Send + Sync {
    async fn store_fact(&self, text: &str) -> Result<()>;
    async fn search(&self, query: &str, k: usize) -> Result<Vec<MemoryHit>>;
    async fn forget(&self, query: &str) -> Result<usize>;
    /// Whether any fact has been recorded yet, used as the "stored memories
    /// exist" amplification signal (§4.11).
    async fn has_any_facts(&self) -> Result<bool>;
}

/// In-memory reference implementation (§9: at least one reference impl for
/// tests). Search scores by keyword-overlap ratio.
#[derive(Default)]
pub struct InMemoryMemoryService {
    facts: Mutex<Vec<String>>,
}

impl InMemoryMemoryService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn store_fact(&self, text: &str) -> Result<()> {
        self.facts.lock().push(text.to_owned());
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<MemoryHit>> {
        let query_words: Vec<String> = query.to_lowercase().split_whitespace().map(str::to_owned).collect();
        let facts = self.facts.lock();
        let mut scored: Vec<MemoryHit> = facts
            .iter()
            .map(|fact| {
                let fact_lower = fact.to_lowercase();
                let overlap = query_words
                    .iter()
                    .filter(|w| fact_lower.contains(w.as_str()))
                    .count();
                let score = if query_words.is_empty() {
                    0.0
                } else {
                    overlap as f32 / query_words.len() as f32
                };
                MemoryHit {
                    content: fact.clone(),
                    score,
                    source: "in_memory".to_owned(),
                    metadata: HashMap::new(),
                }
            })
            .filter(|hit| hit.score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        scored.truncate(k);
        Ok(scored)
    }

    async fn forget(&self, query: &str) -> Result<usize> {
        let query_lower = query.to_lowercase();
        let mut facts = self.facts.lock();
        let before = facts.len();
        facts.retain(|f| !f.to_lowercase().contains(&query_lower));
        Ok(before - facts.len())
    }

    async fn has_any_facts(&self) -> Result<bool> {
        Ok(!self.facts.lock().is_empty())
    }
}

struct LevelPattern {
    regex: Regex,
    level: RagLevel,
}

/// Checked in order; the first match wins, highest tier first so a query
/// that mentions both "remember" and "analyze" lands Comprehensive (§4.11).
static LEVEL_PATTERNS: Lazy<Vec<LevelPattern>> = Lazy::new(|| {
    vec![
        LevelPattern {
            regex: Regex::new(r"(?i)\b(analyze|research (the )?documents?|comprehensive|in[- ]depth|thorough(ly)? research)\b").unwrap(),
            level: RagLevel::Comprehensive,
        },
        LevelPattern {
            regex: Regex::new(r"(?i)\b(remember|recall|my preferences?|last time|what did i (say|tell)|previously mentioned)\b").unwrap(),
            level: RagLevel::Standard,
        },
        LevelPattern {
            regex: Regex::new(r"(?i)\b(also|what about|earlier|before that|following up|as (i|we) (said|discussed))\b").unwrap(),
            level: RagLevel::Minimal,
        },
    ]
});

/// Patterns that explicitly force `Disabled` even if a weaker pattern above
/// would otherwise match (greetings, general-knowledge phrasing, §4.11).
static DISABLED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^(hi|hello|hey|thanks|thank you|goodbye|bye)\b").unwrap(),
        Regex::new(r"(?i)\bwhat is the capital of\b").unwrap(),
    ]
});

fn classify_level_from_text(text: &str) -> RagLevel {
    if DISABLED_PATTERNS.iter().any(|p| p.is_match(text)) {
        return RagLevel::Disabled;
    }
    LEVEL_PATTERNS
        .iter()
        .find(|p| p.regex.is_match(text))
        .map_or(RagLevel::Disabled, |p| p.level)
}

/// Classifies RAG activation level and builds a [`RagQuery`] (§4.11).
pub struct RagGate {
    min_confidence: f32,
    enabled: bool,
    cache: Mutex<HashMap<(String, u8, usize), Vec<MemoryHit>>>,
}

impl RagGate {
    #[must_use]
    pub fn new(config: &RagConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            enabled: config.enabled,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build a [`RagQuery`] for `text` by matching pattern/keyword tables
    /// over the query text itself (§4.11), not the classifier's confidence
    /// score. `memory_exists` amplifies the level one tier; `Instant`
    /// complexity attenuates it one tier (floor `Disabled`), since an
    /// instant-tier query by definition doesn't need retrieval depth.
    #[must_use]
    pub fn build_query(
        &self,
        text: &str,
        classifier_confidence: f32,
        complexity: QueryComplexity,
        memory_exists: bool,
    ) -> RagQuery {
        let keywords: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() > 3)
            .collect();

        let mut level = if !self.enabled {
            RagLevel::Disabled
        } else {
            classify_level_from_text(text)
        };

        if self.enabled {
            if memory_exists {
                level = level.promote();
            }
            if complexity == QueryComplexity::Instant {
                level = level.demote();
            }
            // A low classifier confidence on an otherwise-Disabled query
            // still benefits from a minimal retrieval pass to disambiguate.
            if level == RagLevel::Disabled && classifier_confidence < self.min_confidence && !keywords.is_empty() {
                level = RagLevel::Minimal;
            }
        }

        RagQuery {
            original: text.to_owned(),
            processed: text.trim().to_lowercase(),
            level,
            keywords,
            confidence: classifier_confidence,
        }
    }

    /// `k` (number of retrieved memories) to request for a given level.
    #[must_use]
    pub fn k_for_level(level: RagLevel) -> usize {
        match level {
            RagLevel::Disabled => 0,
            RagLevel::Minimal => 1,
            RagLevel::Standard => 3,
            RagLevel::Comprehensive => 6,
        }
    }

    /// Run the gate end-to-end against a memory service, swallowing errors
    /// per §7 (memory errors never fail the conversation, just skip RAG
    /// content). Cached by `(processed_query, level, max_results)` (§4.11).
    pub async fn retrieve(
        &self,
        memory: &dyn MemoryService,
        text: &str,
        classifier_confidence: f32,
        complexity: QueryComplexity,
        memory_exists: bool,
    ) -> Vec<MemoryHit> {
        let query = self.build_query(text, classifier_confidence, complexity, memory_exists);
        let k = Self::k_for_level(query.level);
        if k == 0 {
            return Vec::new();
        }

        let cache_key = (query.processed.clone(), query.level as u8, k);
        if let Some(cached) = self.cache.lock().get(&cache_key) {
            return cached.clone();
        }

        let hits = match memory.search(&query.processed, k).await {
            Ok(hits) => hits,
            Err(_) => Vec::new(),
        };
        self.cache.lock().insert(cache_key, hits.clone());
        hits
    }
}

#[cfg(feature = "sqlite-memory")]
pub mod sqlite {
    //! Optional sqlite-backed [`super::MemoryService`] reference
    //! implementation, grounded on the teacher's `memory/sqlite.rs` table
    //! layout (a facts table keyed by id, guarded by an internal mutex since
    //! `rusqlite::Connection` is not `Sync`).

    use super::{MemoryHit, MemoryService};
    use crate::error::{AssistantError, Result};
    use async_trait::async_trait;
    use rusqlite::{params, Connection};
    use std::path::Path;
    use std::sync::Mutex;

    pub struct SqliteMemoryService {
        conn: Mutex<Connection>,
    }

    impl SqliteMemoryService {
        /// Open (creating if absent) a sqlite-backed fact store at `path`.
        ///
        /// # Errors
        ///
        /// Returns [`AssistantError::Memory`] if the database cannot be
        /// opened or the schema cannot be applied.
        pub fn open(path: &Path) -> Result<Self> {
            let conn = Connection::open(path)
                .map_err(|e| AssistantError::Memory(format!("failed to open db: {e}")))?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS facts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    text TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                [],
            )
            .map_err(|e| AssistantError::Memory(format!("failed to apply schema: {e}")))?;
            Ok(Self {
                conn: Mutex::new(conn),
            })
        }
    }

    #[async_trait]
    impl MemoryService for SqliteMemoryService {
        async fn store_fact(&self, text: &str) -> Result<()> {
            let conn = self
                .conn
                .lock()
                .map_err(|e| AssistantError::Memory(format!("lock poisoned: {e}")))?;
            let now = chrono::Utc::now().timestamp();
            conn.execute(
                "INSERT INTO facts (text, created_at) VALUES (?1, ?2)",
                params![text, now],
            )
            .map_err(|e| AssistantError::Memory(format!("insert failed: {e}")))?;
            Ok(())
        }

        async fn search(&self, query: &str, k: usize) -> Result<Vec<MemoryHit>> {
            let conn = self
                .conn
                .lock()
                .map_err(|e| AssistantError::Memory(format!("lock poisoned: {e}")))?;
            let pattern = format!("%{query}%");
            let mut stmt = conn
                .prepare("SELECT text FROM facts WHERE text LIKE ?1 ORDER BY id DESC LIMIT ?2")
                .map_err(|e| AssistantError::Memory(format!("prepare failed: {e}")))?;
            let rows = stmt
                .query_map(params![pattern, k as i64], |row| row.get::<_, String>(0))
                .map_err(|e| AssistantError::Memory(format!("query failed: {e}")))?;
            let mut hits = Vec::new();
            for row in rows {
                let text = row.map_err(|e| AssistantError::Memory(format!("row read failed: {e}")))?;
                hits.push(MemoryHit {
                    content: text,
                    score: 1.0,
                    source: "sqlite".to_owned(),
                    metadata: std::collections::HashMap::new(),
                });
            }
            Ok(hits)
        }

        async fn forget(&self, query: &str) -> Result<usize> {
            let conn = self
                .conn
                .lock()
                .map_err(|e| AssistantError::Memory(format!("lock poisoned: {e}")))?;
            let pattern = format!("%{query}%");
            let affected = conn
                .execute("DELETE FROM facts WHERE text LIKE ?1", params![pattern])
                .map_err(|e| AssistantError::Memory(format!("delete failed: {e}")))?;
            Ok(affected)
        }

        async fn has_any_facts(&self) -> Result<bool> {
            let conn = self
                .conn
                .lock()
                .map_err(|e| AssistantError::Memory(format!("lock poisoned: {e}")))?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM facts", [], |row| row.get(0))
                .map_err(|e| AssistantError::Memory(format!("count failed: {e}")))?;
            Ok(count > 0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_then_search_finds_fact() {
        let memory = InMemoryMemoryService::new();
        memory.store_fact("I prefer dark roast coffee").await.unwrap();
        let hits = memory.search("dark roast", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("dark roast"));
    }

    #[tokio::test]
    async fn forget_removes_matching_facts() {
        let memory = InMemoryMemoryService::new();
        memory.store_fact("I prefer dark roast coffee").await.unwrap();
        let removed = memory.forget("dark roast").await.unwrap();
        assert_eq!(removed, 1);
        let hits = memory.search("dark roast", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn has_any_facts_reflects_store_state() {
        let memory = InMemoryMemoryService::new();
        assert!(!memory.has_any_facts().await.unwrap());
        memory.store_fact("something").await.unwrap();
        assert!(memory.has_any_facts().await.unwrap());
    }

    fn gate(min_confidence: f32, enabled: bool) -> RagGate {
        RagGate::new(&RagConfig {
            min_confidence,
            enabled,
        })
    }

    #[test]
    fn remember_phrasing_triggers_standard_level() {
        let query = gate(0.7, true).build_query(
            "remember that I like dark roast",
            0.9,
            QueryComplexity::SimpleReasoning,
            false,
        );
        assert_eq!(query.level, RagLevel::Standard);
    }

    #[test]
    fn analyze_phrasing_triggers_comprehensive_level() {
        let query = gate(0.7, true).build_query(
            "analyze my research documents on this topic",
            0.9,
            QueryComplexity::ComplexMultiStep,
            false,
        );
        assert_eq!(query.level, RagLevel::Comprehensive);
    }

    #[test]
    fn greeting_is_disabled_regardless_of_confidence() {
        let query = gate(0.7, true).build_query("hello there", 0.2, QueryComplexity::Instant, false);
        assert_eq!(query.level, RagLevel::Disabled);
    }

    #[test]
    fn disabled_config_always_yields_disabled_level() {
        let query = gate(0.7, false).build_query(
            "remember my preferences",
            0.95,
            QueryComplexity::SimpleReasoning,
            false,
        );
        assert_eq!(query.level, RagLevel::Disabled);
    }

    #[test]
    fn memory_exists_amplifies_level_by_one_tier() {
        let g = gate(0.7, true);
        let without = g.build_query("what about that", 0.9, QueryComplexity::SimpleReasoning, false);
        let with = g.build_query("what about that", 0.9, QueryComplexity::SimpleReasoning, true);
        assert_eq!(without.level, RagLevel::Minimal);
        assert_eq!(with.level, RagLevel::Standard);
    }

    #[test]
    fn instant_complexity_attenuates_level_by_one_tier() {
        let query = gate(0.7, true).build_query(
            "remember that I like dark roast",
            0.9,
            QueryComplexity::Instant,
            false,
        );
        assert_eq!(query.level, RagLevel::Minimal);
    }

    #[test]
    fn instant_attenuation_floors_at_disabled() {
        let query = gate(0.7, true).build_query("hello there", 0.9, QueryComplexity::Instant, false);
        assert_eq!(query.level, RagLevel::Disabled);
    }

    #[tokio::test]
    async fn retrieve_returns_empty_when_disabled() {
        let gate = gate(0.7, false);
        let memory = InMemoryMemoryService::new();
        memory.store_fact("some fact").await.unwrap();
        let hits = gate
            .retrieve(&memory, "some fact", 0.9, QueryComplexity::SimpleReasoning, false)
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn retrieve_finds_remembered_fact_at_standard_level() {
        let gate = gate(0.7, true);
        let memory = InMemoryMemoryService::new();
        memory.store_fact("my dog's name is Biscuit").await.unwrap();
        let hits = gate
            .retrieve(
                &memory,
                "remember my dog's name",
                0.9,
                QueryComplexity::SimpleReasoning,
                false,
            )
            .await;
        assert!(!hits.is_empty());
    }
}
