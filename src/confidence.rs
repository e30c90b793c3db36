//! Transcript confidence scoring (C5).
//!
//! A pure function of [`Transcript`]: weighted sum of six factors, used by
//! the coordinator to decide whether to route a command or ask the user to
//! repeat themselves (§4.5).

use crate::pipeline::messages::Transcript;
use std::collections::HashMap;

/// Qualitative confidence band, thresholds per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Medium
        } else if score >= 0.4 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

/// Scored transcript confidence with per-factor breakdown (§3).
#[derive(Debug, Clone)]
pub struct ConfidenceReport {
    pub text: String,
    pub overall: f32,
    pub factors: HashMap<String, f32>,
    pub level: ConfidenceLevel,
    pub suggestions: Vec<String>,
}

const CLARIFICATION_PROMPTS: &[&str] = &[
    "Sorry, I didn't quite catch that — could you say it again?",
    "I'm not sure I understood. Could you repeat that?",
    "Could you say that one more time, a bit more clearly?",
];

const FILLER_WORDS: &[&str] = &["um", "uh", "er", "ah", "like", "hmm"];
const QUESTION_WORDS: &[&str] = &["what", "who", "where", "when", "why", "how", "is", "are", "can", "does"];
const ACTION_WORDS: &[&str] = &["play", "set", "open", "turn", "start", "stop", "create", "make", "send", "call"];
const CLARITY_PHRASES: &[&str] = &["please", "thank you", "thanks"];

/// Computes [`ConfidenceReport`] for a transcript (§4.5).
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Score a transcript. Pure with respect to its input.
    #[must_use]
    pub fn score(&self, transcript: &Transcript) -> ConfidenceReport {
        let text = transcript.text.trim();
        let words: Vec<&str> = text.split_whitespace().collect();

        let mut factors = HashMap::new();
        let engine_confidence = transcript.engine_confidence.unwrap_or(0.5);
        factors.insert("engine_confidence".to_owned(), engine_confidence);

        let text_length = score_text_length(words.len());
        factors.insert("text_length".to_owned(), text_length);

        let word_clarity = score_word_clarity(&words);
        factors.insert("word_clarity".to_owned(), word_clarity);

        let command_pattern = score_command_pattern(text, &words);
        factors.insert("command_pattern".to_owned(), command_pattern);

        let grammar_structure = score_grammar_structure(text);
        factors.insert("grammar_structure".to_owned(), grammar_structure);

        let repetition = score_repetition(&words);
        factors.insert("repetition".to_owned(), repetition);

        let overall = engine_confidence * 0.30
            + text_length * 0.15
            + word_clarity * 0.25
            + command_pattern * 0.15
            + grammar_structure * 0.10
            + repetition * 0.05;
        let overall = overall.clamp(0.0, 1.0);
        let level = ConfidenceLevel::from_score(overall);

        let suggestions = if matches!(level, ConfidenceLevel::Low | ConfidenceLevel::VeryLow) {
            vec![pick_clarification(text).to_owned()]
        } else {
            Vec::new()
        };

        ConfidenceReport {
            text: transcript.text.clone(),
            overall,
            factors,
            level,
            suggestions,
        }
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new()
    }
}

fn score_text_length(word_count: usize) -> f32 {
    match word_count {
        0 => 0.0,
        1 => 0.3,
        2..=20 => 0.9,
        21..=50 => 0.7,
        _ => 0.4,
    }
}

fn score_word_clarity(words: &[&str]) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    let fillers = words
        .iter()
        .filter(|w| FILLER_WORDS.contains(&w.to_lowercase().as_str()))
        .count();
    let filler_ratio = fillers as f32 / words.len() as f32;
    let clarity_bonus = words
        .iter()
        .filter(|w| CLARITY_PHRASES.contains(&w.to_lowercase().as_str()))
        .count() as f32
        * 0.2;
    (0.8 - 0.5 * filler_ratio + clarity_bonus.min(0.4)).clamp(0.0, 1.0)
}

fn score_command_pattern(text: &str, words: &[&str]) -> f32 {
    let lower = text.to_lowercase();
    let is_command_shape = lower.starts_with("please ")
        || lower.ends_with('.')
        || words.first().map(|w| ACTION_WORDS.contains(&w.to_lowercase().as_str())).unwrap_or(false)
            && lower.ends_with('.');
    if is_command_shape {
        return 0.9;
    }
    if words
        .first()
        .map(|w| QUESTION_WORDS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false)
    {
        return 0.7;
    }
    if words
        .first()
        .map(|w| ACTION_WORDS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false)
    {
        return 0.6;
    }
    0.4
}

fn score_grammar_structure(text: &str) -> f32 {
    let total = text.chars().count().max(1);
    let mut repeated_chars = 0usize;
    let chars: Vec<char> = text.chars().collect();
    for window in chars.windows(2) {
        if window[0] == window[1] {
            repeated_chars += 1;
        }
    }
    let repeated_ratio = repeated_chars as f32 / total as f32;
    let mut score = 0.5;
    if text.chars().next().is_some_and(char::is_uppercase) {
        score += 0.05;
    }
    if repeated_ratio > 0.1 {
        score -= 0.3;
    }
    score.clamp(0.0, 1.0)
}

fn score_repetition(words: &[&str]) -> f32 {
    if words.len() < 2 {
        return 1.0;
    }
    let repeats = words
        .windows(2)
        .filter(|w| w[0].eq_ignore_ascii_case(w[1]))
        .count();
    let ratio = repeats as f32 / (words.len() - 1) as f32;
    (1.0 - ratio).clamp(0.0, 1.0)
}

fn pick_clarification(text: &str) -> &'static str {
    let idx = text.len() % CLARIFICATION_PROMPTS.len();
    CLARIFICATION_PROMPTS[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn transcript(text: &str, engine_confidence: Option<f32>) -> Transcript {
        Transcript {
            text: text.to_owned(),
            engine_confidence,
            language_tag: "en".to_owned(),
            duration_ms: 1000,
            audio_captured_at: Instant::now(),
            transcribed_at: Instant::now(),
        }
    }

    #[test]
    fn clear_command_scores_high() {
        let scorer = ConfidenceScorer::new();
        let report = scorer.score(&transcript("what time is it", Some(0.95)));
        assert!(matches!(report.level, ConfidenceLevel::High | ConfidenceLevel::Medium));
    }

    #[test]
    fn filler_heavy_text_scores_low() {
        let scorer = ConfidenceScorer::new();
        let report = scorer.score(&transcript("um uh the the hello", Some(0.3)));
        assert!(matches!(report.level, ConfidenceLevel::Low | ConfidenceLevel::VeryLow));
        assert!(!report.suggestions.is_empty());
    }

    #[test]
    fn empty_text_does_not_crash() {
        let scorer = ConfidenceScorer::new();
        let report = scorer.score(&transcript("", None));
        assert!(report.overall >= 0.0 && report.overall <= 1.0);
    }

    #[test]
    fn overall_always_in_unit_range() {
        let scorer = ConfidenceScorer::new();
        for text in ["a", "hello world", &"word ".repeat(60)] {
            let report = scorer.score(&transcript(text, Some(1.0)));
            assert!((0.0..=1.0).contains(&report.overall));
        }
    }
}
