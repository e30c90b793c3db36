//! Wake word detection over transcribed text (C4).
//!
//! Operates on [`Transcript::text`], not raw audio: the teacher's wake
//! spotter (`wakeword.rs`) runs MFCC+DTW against the audio signal directly,
//! but this pipeline only sees text once ASR has run in the `Idle` state, so
//! detection here is a fuzzy string match against the configured wake-word
//! set rather than an acoustic comparison.

use crate::config::WakeConfig;
use crate::pipeline::messages::Transcript;
use std::time::Instant;

/// Result of matching one piece of text against the configured wake words.
#[derive(Debug, Clone, PartialEq)]
pub struct WakeDetection {
    /// Whether any configured wake word scored at or above sensitivity.
    pub detected: bool,
    /// The wake word that produced the best score.
    pub matched_word: Option<String>,
    /// Best score across all configured wake words, in `[0, 1]`.
    pub score: f32,
}

/// Text-based wake word matcher (§4.4).
pub struct WakeDetector {
    words: Vec<String>,
    sensitivity: f32,
    last_detected_at: Option<Instant>,
}

impl WakeDetector {
    #[must_use]
    pub fn new(config: &WakeConfig) -> Self {
        Self {
            words: config.words.iter().map(|w| w.to_lowercase()).collect(),
            sensitivity: config.sensitivity,
            last_detected_at: None,
        }
    }

    /// Pure scoring method: match `text` against the configured wake-word
    /// set and report the best result. Does not mutate detector state.
    #[must_use]
    pub fn detect_in_text(&self, text: &str) -> WakeDetection {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() || self.words.is_empty() {
            return WakeDetection {
                detected: false,
                matched_word: None,
                score: 0.0,
            };
        }

        let mut best_score = 0.0f32;
        let mut best_word: Option<&str> = None;
        for word in &self.words {
            let score = score_word(&normalized, word);
            if score > best_score {
                best_score = score;
                best_word = Some(word);
            }
        }

        WakeDetection {
            detected: best_score >= self.sensitivity,
            matched_word: best_word.map(str::to_owned),
            score: best_score,
        }
    }

    /// Run detection against a transcript produced in the `Idle` state,
    /// recording the detection timestamp if one occurs.
    pub fn process_transcript(&mut self, transcript: &Transcript) -> WakeDetection {
        let detection = self.detect_in_text(&transcript.text);
        if detection.detected {
            self.last_detected_at = Some(Instant::now());
        }
        detection
    }

    /// Timestamp of the most recent successful detection, if any.
    #[must_use]
    pub fn last_detected_at(&self) -> Option<Instant> {
        self.last_detected_at
    }
}

/// Score a single wake word against normalized text: exact whole-text match
/// scores 1.0, a substring match scores 0.8, otherwise fall back to a
/// fuzzy character-prefix ratio over each word in the text (§4.4).
fn score_word(normalized_text: &str, word: &str) -> f32 {
    if normalized_text == word {
        return 1.0;
    }
    if normalized_text.split_whitespace().any(|w| w == word) || normalized_text.contains(word) {
        return 0.8;
    }
    normalized_text
        .split_whitespace()
        .map(|token| fuzzy_word_match(token, word))
        .fold(0.0f32, f32::max)
}

/// Character-wise prefix match ratio over `max(len)`, capped below the
/// substring-match score so fuzzy matches never outrank exact/substring.
fn fuzzy_word_match(token: &str, word: &str) -> f32 {
    let common = token
        .chars()
        .zip(word.chars())
        .take_while(|(a, b)| a == b)
        .count();
    let denom = token.len().max(word.len()).max(1) as f32;
    (common as f32 / denom).min(0.7)
}
