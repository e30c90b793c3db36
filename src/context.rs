//! Sliding, relevance-weighted conversation context window (C9).
//!
//! Bounded ring of [`ContextEntry`] plus a bounded list of compressed
//! summary strings (§4.9). Compression keeps `current_tokens` within budget
//! without ever dropping Critical-priority entries from `get_optimized`.

use crate::config::ContextConfig;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

/// Entry priority; higher values always survive compression (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Minimal = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    Critical = 5,
}

/// Entry kind, tracked for future routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    UserUtterance,
    AssistantReply,
    SystemNote,
    ToolResult,
}

/// One unit of conversation memory (§3).
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub content: String,
    pub timestamp: SystemTime,
    pub priority: Priority,
    pub relevance: f32,
    pub token_count: usize,
    pub kind: EntryKind,
    pub keywords: Vec<String>,
}

impl ContextEntry {
    #[must_use]
    pub fn new(content: &str, priority: Priority, kind: EntryKind) -> Self {
        let token_count = estimate_tokens(content);
        let keywords = extract_keywords(content);
        Self {
            content: content.to_owned(),
            timestamp: SystemTime::now(),
            priority,
            relevance: 1.0,
            token_count,
            kind,
            keywords,
        }
    }

    fn age_hours(&self) -> f32 {
        self.timestamp
            .elapsed()
            .map(|d| d.as_secs_f32() / 3600.0)
            .unwrap_or(0.0)
    }

    /// Weighted score = relevance · priority/5 · age_decay(age_hours) (§3).
    #[must_use]
    pub fn weighted_score(&self) -> f32 {
        let age_decay = 1.0 / (1.0 + self.age_hours() / 2.0);
        self.relevance * (self.priority as i32 as f32 / 5.0) * age_decay
    }
}

/// Estimate token count as chars/4 (§4.9).
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / 4).max(1)
}

fn extract_keywords(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 3)
        .collect()
}

/// Sliding context window with compression (§4.9).
pub struct ContextWindow {
    entries: Vec<ContextEntry>,
    summaries: Vec<String>,
    active_keywords: HashMap<String, f32>,
    max_tokens: usize,
    max_entries: usize,
    compression_threshold: f32,
}

impl ContextWindow {
    #[must_use]
    pub fn new(config: &ContextConfig) -> Self {
        Self {
            entries: Vec::new(),
            summaries: Vec::new(),
            active_keywords: HashMap::new(),
            max_tokens: config.max_tokens,
            max_entries: config.max_entries,
            compression_threshold: config.compression_threshold,
        }
    }

    /// Append an entry, decay the active-keyword table, and compress if
    /// `current_tokens > compression_threshold * max_tokens` (§4.9).
    ///
    /// Invariant: sum of live token_counts ≤ `max_tokens` after this returns
    /// (invariant 3, §8).
    pub fn add(&mut self, entry: ContextEntry) {
        for value in self.active_keywords.values_mut() {
            *value *= 0.95;
        }
        for keyword in &entry.keywords {
            *self.active_keywords.entry(keyword.clone()).or_insert(0.0) += 1.0;
        }

        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            self.entries.remove(0);
        }

        let trigger = (self.compression_threshold * self.max_tokens as f32) as usize;
        if self.current_tokens() > trigger {
            self.compress();
        }
        while self.current_tokens() > self.max_tokens && self.entries.len() > 1 {
            self.compress();
        }
    }

    fn current_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.token_count).sum()
    }

    /// Compress the oldest third of low-weighted entries into a summary
    /// string (§4.9).
    fn compress(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let chunk = (self.entries.len() / 3).max(1);
        let candidates: Vec<usize> = self.entries[..chunk.min(self.entries.len())]
            .iter()
            .enumerate()
            .filter(|(_, e)| e.weighted_score() < 0.3)
            .map(|(i, _)| i)
            .collect();

        if candidates.is_empty() {
            // Nothing eligible; drop the single oldest non-critical entry to
            // guarantee forward progress under the token budget.
            if let Some(idx) = self
                .entries
                .iter()
                .position(|e| e.priority != Priority::Critical)
            {
                self.entries.remove(idx);
            } else if !self.entries.is_empty() {
                self.entries.remove(0);
            }
            return;
        }

        let mut removed = Vec::new();
        for &idx in candidates.iter().rev() {
            removed.push(self.entries.remove(idx));
        }
        removed.reverse();

        let mut keyword_counts: HashMap<String, u32> = HashMap::new();
        for entry in &removed {
            for kw in &entry.keywords {
                *keyword_counts.entry(kw.clone()).or_insert(0) += 1;
            }
        }
        let mut top: Vec<(&String, &u32)> = keyword_counts.iter().collect();
        top.sort_by(|a, b| b.1.cmp(a.1));
        let top3: Vec<String> = top.into_iter().take(3).map(|(k, _)| k.clone()).collect();

        if !top3.is_empty() {
            let summary = format!(
                "User asked about {}; Discussed {}",
                top3.first().cloned().unwrap_or_default(),
                top3.join(", ")
            );
            self.summaries.push(summary);
            if self.summaries.len() > 2 {
                self.summaries.remove(0);
            }
        }
    }

    /// Produce a chronologically ordered context for the next LLM call,
    /// capped to `max_tokens`, always including Critical entries even if
    /// that exceeds budget (§4.9).
    #[must_use]
    pub fn get_optimized(&self, _current_query: &str, max_tokens: usize) -> String {
        let summary_budget = (max_tokens as f32 * 0.3) as usize;
        let recent_summaries: Vec<&String> = self.summaries.iter().rev().take(2).collect();
        let mut summary_text = String::new();
        let mut summary_tokens = 0usize;
        for summary in recent_summaries.into_iter().rev() {
            let tokens = estimate_tokens(summary);
            if summary_tokens + tokens > summary_budget && summary_tokens > 0 {
                break;
            }
            summary_text.push_str(summary);
            summary_text.push('\n');
            summary_tokens += tokens;
        }

        let remaining_budget = max_tokens.saturating_sub(summary_tokens);
        let mut by_score: Vec<&ContextEntry> = self.entries.iter().collect();
        by_score.sort_by(|a, b| b.weighted_score().partial_cmp(&a.weighted_score()).unwrap());

        let mut selected: Vec<&ContextEntry> = Vec::new();
        let mut used = 0usize;
        for entry in by_score {
            if entry.priority == Priority::Critical {
                selected.push(entry);
                used += entry.token_count;
                continue;
            }
            if used + entry.token_count <= remaining_budget {
                selected.push(entry);
                used += entry.token_count;
            }
        }

        selected.sort_by_key(|e| e.timestamp);

        let mut body = summary_text;
        for entry in selected {
            body.push_str(&entry.content);
            body.push('\n');
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ContextConfig {
        ContextConfig {
            max_tokens: 200,
            max_entries: 50,
            compression_threshold: 0.8,
        }
    }

    #[test]
    fn add_keeps_tokens_within_budget() {
        let mut window = ContextWindow::new(&config());
        for i in 0..30 {
            window.add(ContextEntry::new(
                &format!("this is message number {i} with some extra words to pad it out"),
                Priority::Medium,
                EntryKind::UserUtterance,
            ));
        }
        assert!(window.current_tokens() <= window.max_tokens);
    }

    #[test]
    fn critical_entries_always_included() {
        let mut window = ContextWindow::new(&config());
        window.add(ContextEntry::new(
            "critical system note about safety",
            Priority::Critical,
            EntryKind::SystemNote,
        ));
        for i in 0..30 {
            window.add(ContextEntry::new(
                &format!("filler message {i} to force compression cycles along the way"),
                Priority::Low,
                EntryKind::UserUtterance,
            ));
        }
        let optimized = window.get_optimized("query", 50);
        assert!(optimized.contains("critical system note"));
    }

    #[test]
    fn get_optimized_respects_budget_plus_critical_slack() {
        let mut window = ContextWindow::new(&config());
        for i in 0..5 {
            window.add(ContextEntry::new(
                &format!("entry {i}"),
                Priority::Medium,
                EntryKind::UserUtterance,
            ));
        }
        let optimized = window.get_optimized("query", 20);
        assert!(estimate_tokens(&optimized) <= 20 + 50);
    }

    #[test]
    fn estimate_tokens_is_chars_over_four() {
        assert_eq!(estimate_tokens("12345678"), 2);
    }

    #[test]
    fn weighted_score_decays_priority_and_age() {
        let entry = ContextEntry::new("hello world", Priority::Low, EntryKind::UserUtterance);
        let critical = ContextEntry::new("hello world", Priority::Critical, EntryKind::UserUtterance);
        assert!(critical.weighted_score() > entry.weighted_score());
    }
}
