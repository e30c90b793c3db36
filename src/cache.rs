//! Four-tier response cache (C8).
//!
//! Grounded on the teacher's `memory.rs` append-only JSONL persistence
//! pattern, generalized here to an LRU+TTL map per tier (§4.8) rather than a
//! single unbounded record log. Centralizes TTL + LRU + byte accounting in
//! one type per the "cache correctness" re-architecture note (§9) — no
//! ad-hoc caches elsewhere in the pipeline.

use crate::config::CacheConfig;
use crate::error::{AssistantError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Cache tier, each with its own TTL policy (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    Instant,
    Prompt,
    Response,
    Context,
}

impl CacheTier {
    fn ttl(self) -> Option<Duration> {
        match self {
            Self::Instant => None,
            Self::Prompt => Some(Duration::from_secs(24 * 3600)),
            Self::Response => Some(Duration::from_secs(3600)),
            Self::Context => Some(Duration::from_secs(30 * 60)),
        }
    }

    fn all() -> [CacheTier; 4] {
        [Self::Instant, Self::Prompt, Self::Response, Self::Context]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    value: String,
    created_at: SystemTime,
    last_accessed: SystemTime,
    hit_count: u64,
    size_bytes: usize,
}

struct TierStore {
    entries: HashMap<String, CacheEntry>,
    /// Recency order, most-recently-used at the back, for LRU eviction.
    order: Vec<String>,
}

impl TierStore {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        self.order.push(key.to_owned());
    }

    fn total_bytes(&self) -> usize {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}

/// LRU+TTL cache with four independent tiers (§4.8).
pub struct ResponseCache {
    tiers: Mutex<HashMap<CacheTier, TierStore>>,
    max_entries_per_tier: usize,
    max_bytes: usize,
    persistence: bool,
}

impl ResponseCache {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        let mut tiers = HashMap::new();
        for tier in CacheTier::all() {
            tiers.insert(tier, TierStore::new());
        }
        Self {
            tiers: Mutex::new(tiers),
            max_entries_per_tier: (config.max_entries / 4).max(1),
            max_bytes: (config.max_memory_mb * 1024.0 * 1024.0) as usize,
            persistence: config.persistence,
        }
    }

    /// Get a value by tier and key. Expired entries are removed on access
    /// and never returned (invariant 2, §8).
    #[must_use]
    pub fn get(&self, tier: CacheTier, key: &str) -> Option<String> {
        let mut tiers = self.tiers.lock();
        let store = tiers.get_mut(&tier)?;
        let expired = store
            .entries
            .get(key)
            .map(|e| is_expired(e, tier))
            .unwrap_or(false);
        if expired {
            store.entries.remove(key);
            store.order.retain(|k| k != key);
            return None;
        }
        let value = store.entries.get(key).map(|e| e.value.clone());
        if value.is_some() {
            store.touch(key);
            if let Some(e) = store.entries.get_mut(key) {
                e.last_accessed = SystemTime::now();
                e.hit_count += 1;
            }
        }
        value
    }

    /// Insert a value into a tier, evicting LRU entries as needed to respect
    /// both the per-tier entry cap and the global byte budget.
    pub fn put(&self, tier: CacheTier, key: &str, value: String) {
        let size_bytes = key.len() + value.len();
        let mut tiers = self.tiers.lock();

        {
            let store = tiers.get_mut(&tier).expect("all tiers initialized");
            store.entries.insert(
                key.to_owned(),
                CacheEntry {
                    key: key.to_owned(),
                    value,
                    created_at: SystemTime::now(),
                    last_accessed: SystemTime::now(),
                    hit_count: 0,
                    size_bytes,
                },
            );
            store.touch(key);
            while store.entries.len() > self.max_entries_per_tier {
                evict_lru(store);
            }
        }

        self.enforce_global_byte_budget(&mut tiers);
    }

    fn enforce_global_byte_budget(&self, tiers: &mut HashMap<CacheTier, TierStore>) {
        loop {
            let total: usize = tiers.values().map(TierStore::total_bytes).sum();
            if total <= self.max_bytes {
                break;
            }
            let Some((_, largest)) = tiers
                .iter_mut()
                .max_by_key(|(_, store)| store.total_bytes())
            else {
                break;
            };
            if largest.order.is_empty() {
                break;
            }
            evict_lru(largest);
        }
    }

    /// Serialize all non-expired entries for a tier as newline-delimited
    /// JSON, append-only snapshot style (§6 persisted-state contract).
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Cache`] if persistence is disabled or
    /// serialization/IO fails.
    pub fn save(&self, tier: CacheTier, path: &Path) -> Result<()> {
        if !self.persistence {
            return Err(AssistantError::Cache("persistence disabled".into()));
        }
        let tiers = self.tiers.lock();
        let store = tiers
            .get(&tier)
            .ok_or_else(|| AssistantError::Cache("unknown tier".into()))?;
        let mut lines = Vec::new();
        for entry in store.entries.values() {
            if is_expired(entry, tier) {
                continue;
            }
            let line = serde_json::to_string(entry)
                .map_err(|e| AssistantError::Cache(format!("serialize failed: {e}")))?;
            lines.push(line);
        }
        std::fs::write(path, lines.join("\n"))?;
        Ok(())
    }

    /// Load a tier's entries from a snapshot file, discarding any already
    /// expired (§6).
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::Cache`] on a malformed snapshot line.
    pub fn load(&self, tier: CacheTier, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(path)?;
        let mut tiers = self.tiers.lock();
        let store = tiers
            .get_mut(&tier)
            .ok_or_else(|| AssistantError::Cache("unknown tier".into()))?;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let entry: CacheEntry = serde_json::from_str(line)
                .map_err(|e| AssistantError::Cache(format!("malformed snapshot line: {e}")))?;
            if is_expired(&entry, tier) {
                continue;
            }
            store.order.push(entry.key.clone());
            store.entries.insert(entry.key.clone(), entry);
        }
        Ok(())
    }
}

fn is_expired(entry: &CacheEntry, tier: CacheTier) -> bool {
    match tier.ttl() {
        None => false,
        Some(ttl) => entry
            .created_at
            .elapsed()
            .map(|elapsed| elapsed >= ttl)
            .unwrap_or(false),
    }
}

fn evict_lru(store: &mut TierStore) {
    if store.order.is_empty() {
        return;
    }
    let key = store.order.remove(0);
    store.entries.remove(&key);
}

/// MD5 hash helper for Prompt/Response tier keys (§4.8).
#[must_use]
pub fn md5_key(parts: &[&str]) -> String {
    use md5::{Digest, Md5};
    let joined = parts.join("|");
    let mut hasher = Md5::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            max_entries: 8,
            max_memory_mb: 500.0,
            persistence: true,
        })
    }

    #[test]
    fn put_then_get_within_ttl_returns_value() {
        let cache = cache();
        cache.put(CacheTier::Instant, "hello", "Hi there!".to_owned());
        assert_eq!(cache.get(CacheTier::Instant, "hello"), Some("Hi there!".to_owned()));
    }

    #[test]
    fn missing_key_returns_none() {
        let cache = cache();
        assert!(cache.get(CacheTier::Response, "nope").is_none());
    }

    #[test]
    fn evicts_lru_past_per_tier_capacity() {
        let cache = cache();
        for i in 0..4 {
            cache.put(CacheTier::Instant, &format!("k{i}"), "v".to_owned());
        }
        // max_entries_per_tier = 8/4 = 2
        assert!(cache.get(CacheTier::Instant, "k0").is_none());
        assert!(cache.get(CacheTier::Instant, "k3").is_some());
    }

    #[test]
    fn save_and_load_round_trips() {
        let cache = cache();
        cache.put(CacheTier::Instant, "hello", "Hi!".to_owned());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("instant.jsonl");
        cache.save(CacheTier::Instant, &path).unwrap();

        let cache2 = cache();
        cache2.load(CacheTier::Instant, &path).unwrap();
        assert_eq!(cache2.get(CacheTier::Instant, "hello"), Some("Hi!".to_owned()));
    }

    #[test]
    fn md5_key_is_deterministic() {
        let a = md5_key(&["query", "ExplicitFact", "ctx"]);
        let b = md5_key(&["query", "ExplicitFact", "ctx"]);
        assert_eq!(a, b);
    }
}
