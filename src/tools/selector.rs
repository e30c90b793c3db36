//! Keyword/category tool ranking (C10, §4.10).
//!
//! Scores registered tools against a query and bounds the result to `K`
//! tools, favoring category diversity so a complex multi-step query doesn't
//! get K near-duplicate tools from the same category. Selections are
//! memoized by `(normalized query, k, complexity, registry fingerprint)`,
//! the same `parking_lot::Mutex<HashMap<..>>` idiom the classifier (§4.6)
//! uses for its own memoization.

use crate::classifier::QueryComplexity;
use crate::tools::registry::{ToolDescriptor, ToolRegistry};
use parking_lot::Mutex;
use std::collections::{hash_map::DefaultHasher, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::{Duration, SystemTime};

/// Minimum score a tool must clear to be selected, unless no other
/// candidates exist (invariant 4, §8).
pub const MIN_SCORE: f32 = 0.1;

/// Recency window after which a tool no longer counts as "used in the
/// current session" for the diversity penalty (§4.10).
const DIVERSITY_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Window over which the recency bonus decays linearly to zero (§4.10).
const RECENCY_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// A scored candidate tool.
#[derive(Debug, Clone)]
pub struct ScoredTool {
    pub descriptor: ToolDescriptor,
    pub score: f32,
}

/// Ranks tools by keyword/description overlap, direct mention, historical
/// reliability/usage/recency, complexity-based context adjustments, and
/// category diversity (§4.10).
pub struct ToolSelector {
    cache: Mutex<HashMap<(String, usize, u8, u64), Vec<ScoredTool>>>,
}

impl ToolSelector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Select at most `k` tools relevant to `query` for a given
    /// `complexity`, preferring category diversity among near-tied
    /// candidates. Cached by `(normalized query, k, complexity, registry
    /// fingerprint)` -- a cached selection is naturally invalidated as soon
    /// as any tool's usage stats change, since the fingerprint folds those
    /// in (§4.10).
    #[must_use]
    pub fn select(
        &self,
        registry: &ToolRegistry,
        query: &str,
        k: usize,
        complexity: QueryComplexity,
    ) -> Vec<ScoredTool> {
        if k == 0 {
            return Vec::new();
        }
        let normalized = query.trim().to_lowercase();
        let descriptors = registry.list();
        let fingerprint = fingerprint_registry(&descriptors);
        let cache_key = (normalized.clone(), k, complexity as u8, fingerprint);

        if let Some(cached) = self.cache.lock().get(&cache_key) {
            return cached.clone();
        }

        let selected = select_uncached(&descriptors, &normalized, k, complexity);
        self.cache.lock().insert(cache_key, selected.clone());
        selected
    }
}

impl Default for ToolSelector {
    fn default() -> Self {
        Self::new()
    }
}

fn fingerprint_registry(descriptors: &[ToolDescriptor]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for d in descriptors {
        d.id.hash(&mut hasher);
        d.usage_count.hash(&mut hasher);
        (d.success_rate.to_bits()).hash(&mut hasher);
        d.last_used
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .hash(&mut hasher);
    }
    hasher.finish()
}

fn select_uncached(
    descriptors: &[ToolDescriptor],
    normalized_query: &str,
    k: usize,
    complexity: QueryComplexity,
) -> Vec<ScoredTool> {
    let query_words: Vec<&str> = normalized_query.split_whitespace().collect();
    let max_usage = descriptors.iter().map(|d| d.usage_count).max().unwrap_or(0);
    let time_sensitive = is_time_sensitive(normalized_query);

    let mut scored: Vec<ScoredTool> = descriptors
        .iter()
        .map(|descriptor| {
            let score = score_tool(
                descriptor,
                &query_words,
                normalized_query,
                max_usage,
                complexity,
                time_sensitive,
            );
            ScoredTool {
                descriptor: descriptor.clone(),
                score,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

    let mut selected = Vec::new();
    let mut seen_categories = HashSet::new();
    for candidate in &scored {
        if selected.len() >= k {
            break;
        }
        if candidate.score < MIN_SCORE && !selected.is_empty() {
            continue;
        }
        if seen_categories.contains(&candidate.descriptor.category) && selected.len() + 1 < k {
            continue;
        }
        seen_categories.insert(candidate.descriptor.category.clone());
        selected.push(candidate.clone());
    }

    if selected.is_empty() {
        if let Some(best) = scored.into_iter().next() {
            selected.push(best);
        }
    }

    selected.truncate(k);
    selected
}

/// Sum of the six weighted terms from §4.10, each already capped to its own
/// ceiling, then scaled by complexity/time-sensitivity multipliers and the
/// recently-used diversity penalty.
fn score_tool(
    descriptor: &ToolDescriptor,
    query_words: &[&str],
    normalized_query: &str,
    max_usage: u64,
    complexity: QueryComplexity,
    time_sensitive: bool,
) -> f32 {
    if query_words.is_empty() {
        return 0.0;
    }

    let keyword_overlap = overlap_ratio(query_words, &descriptor.keywords) * 0.6;

    let description_words: Vec<String> = descriptor
        .description
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .collect();
    let description_token_overlap = overlap_ratio(query_words, &description_words) * 0.3;

    let direct_mention = if normalized_query.contains(&descriptor.id.to_lowercase()) {
        0.4
    } else {
        0.0
    };

    let usage_frequency_bonus = if max_usage > 0 {
        (descriptor.usage_count as f32 / max_usage as f32) * 0.1
    } else {
        0.0
    };

    let success_bonus = descriptor.success_rate.clamp(0.0, 1.0) * 0.1;

    let recency_bonus = descriptor
        .last_used
        .and_then(|t| t.elapsed().ok())
        .map(|elapsed| {
            let remaining = 1.0 - (elapsed.as_secs_f32() / RECENCY_WINDOW.as_secs_f32()).min(1.0);
            remaining.max(0.0) * 0.05
        })
        .unwrap_or(0.0);

    let base = keyword_overlap + description_token_overlap + direct_mention + usage_frequency_bonus + success_bonus + recency_bonus;

    let mut adjusted = base;
    if complexity == QueryComplexity::Instant
        && matches!(descriptor.category.as_str(), "time" | "memory")
    {
        adjusted *= 1.2;
    }
    if complexity == QueryComplexity::ComplexMultiStep
        && matches!(descriptor.category.as_str(), "code" | "web" | "system")
    {
        adjusted *= 1.3;
    }
    if time_sensitive && descriptor.category == "time" {
        adjusted *= 1.5;
    }
    if was_recently_used(descriptor) {
        adjusted *= 0.8;
    }

    adjusted.min(1.0)
}

fn overlap_ratio(query_words: &[&str], candidate_words: &[String]) -> f32 {
    if query_words.is_empty() || candidate_words.is_empty() {
        return 0.0;
    }
    let matches = query_words
        .iter()
        .filter(|w| candidate_words.iter().any(|c| c == *w))
        .count();
    matches as f32 / query_words.len() as f32
}

fn is_time_sensitive(normalized_query: &str) -> bool {
    ["now", "currently", "right now", "today", "time", "date"]
        .iter()
        .any(|kw| normalized_query.contains(kw))
}

fn was_recently_used(descriptor: &ToolDescriptor) -> bool {
    descriptor
        .last_used
        .and_then(|t| t.elapsed().ok())
        .is_some_and(|elapsed| elapsed <= DIVERSITY_WINDOW)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(tools: &[(&str, &str, &[&str])]) -> ToolRegistry {
        let registry = ToolRegistry::new();
        for (id, category, keywords) in tools {
            let descriptor =
                ToolDescriptor::new(id, id, category).with_keywords(keywords.to_vec());
            registry.register(descriptor);
        }
        registry
    }

    #[test]
    fn selects_at_most_k_tools() {
        let registry = registry_with(&[
            ("time", "utility", &["time", "clock"]),
            ("weather", "utility", &["weather", "forecast"]),
            ("calendar", "utility", &["calendar", "schedule"]),
        ]);
        let selector = ToolSelector::new();
        let result = selector.select(&registry, "what time is it", 2, QueryComplexity::ExplicitFact);
        assert!(result.len() <= 2);
    }

    #[test]
    fn relevant_tool_scores_above_minimum() {
        let registry = registry_with(&[("time", "utility", &["time", "clock"])]);
        let selector = ToolSelector::new();
        let result = selector.select(&registry, "what time is it", 3, QueryComplexity::ExplicitFact);
        assert_eq!(result.len(), 1);
        assert!(result[0].score >= MIN_SCORE);
    }

    #[test]
    fn zero_k_returns_empty() {
        let registry = registry_with(&[("time", "utility", &["time"])]);
        let selector = ToolSelector::new();
        assert!(selector
            .select(&registry, "what time is it", 0, QueryComplexity::ExplicitFact)
            .is_empty());
    }

    #[test]
    fn falls_back_to_best_when_nothing_clears_minimum() {
        let registry = registry_with(&[("obscure", "misc", &["zzz"])]);
        let selector = ToolSelector::new();
        let result = selector.select(
            &registry,
            "completely unrelated query",
            1,
            QueryComplexity::SimpleReasoning,
        );
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn category_diversity_favors_spread_when_k_allows() {
        let registry = registry_with(&[
            ("code_a", "code", &["script", "code"]),
            ("code_b", "code", &["script", "code"]),
            ("system_a", "system", &["disk", "usage"]),
        ]);
        let selector = ToolSelector::new();
        let result = selector.select(
            &registry,
            "create a script for disk usage",
            2,
            QueryComplexity::ComplexMultiStep,
        );
        let categories: HashSet<_> = result.iter().map(|t| t.descriptor.category.clone()).collect();
        assert!(!categories.is_empty());
    }

    #[test]
    fn complex_multi_step_boosts_system_category_tools() {
        let registry = registry_with(&[
            ("code_exec", "code", &["script", "code"]),
            ("time", "time", &["time"]),
        ]);
        let selector = ToolSelector::new();
        let result = selector.select(&registry, "create a script", 1, QueryComplexity::ComplexMultiStep);
        assert_eq!(result[0].descriptor.id, "code_exec");
    }

    #[test]
    fn time_sensitive_query_boosts_time_category() {
        let registry = registry_with(&[
            ("time", "time", &["time", "clock"]),
            ("weather", "utility", &["weather"]),
        ]);
        let selector = ToolSelector::new();
        let result = selector.select(&registry, "what time is it now", 1, QueryComplexity::ExplicitFact);
        assert_eq!(result[0].descriptor.id, "time");
    }

    #[test]
    fn selection_is_cached_for_identical_query_and_k() {
        let registry = registry_with(&[("time", "utility", &["time", "clock"])]);
        let selector = ToolSelector::new();
        let first = selector.select(&registry, "what time is it", 1, QueryComplexity::ExplicitFact);
        let second = selector.select(&registry, "what time is it", 1, QueryComplexity::ExplicitFact);
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].descriptor.id, second[0].descriptor.id);
    }

    #[test]
    fn cache_is_invalidated_after_usage_changes() {
        let registry = registry_with(&[("time", "utility", &["time", "clock"])]);
        let selector = ToolSelector::new();
        let before = selector.select(&registry, "what time is it", 1, QueryComplexity::ExplicitFact);
        registry.record_usage("time", true, Duration::ZERO);
        let after = selector.select(&registry, "what time is it", 1, QueryComplexity::ExplicitFact);
        assert!(after[0].score >= before[0].score);
    }
}
