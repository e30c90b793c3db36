//! Message types passed between pipeline stages.
//!
//! These are the move-only, single-owner values that travel over the
//! channels described in spec §5: a [`PcmFrame`] stream becomes an
//! [`Utterance`] once VAD brackets a speech segment, which becomes a
//! [`Transcript`] once ASR runs, which feeds the wake detector or the
//! router depending on [`crate::pipeline::coordinator`]'s state.

use std::time::Instant;

/// A fixed-size chunk of 16-bit signed PCM samples captured from the
/// microphone. Immutable once produced (§3).
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// Mono samples at `sample_rate`.
    pub samples: Vec<i16>,
    /// Sample rate in Hz (default 16kHz per §6 config).
    pub sample_rate: u32,
    /// Monotonic capture timestamp.
    pub captured_at: Instant,
}

impl PcmFrame {
    /// Convert to normalized `f32` samples in `[-1.0, 1.0]` for VAD/ASR math.
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
    }
}

/// An ordered, finite, non-restartable sequence of [`PcmFrame`]s covering one
/// detected speech segment (§3). Produced by VAD, consumed by ASR, then
/// dropped.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Concatenated samples for the entire segment.
    pub samples: Vec<i16>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// When the segment started.
    pub started_at: Instant,
    /// When the segment ended (silence/timeout boundary reached).
    pub ended_at: Instant,
}

impl Utterance {
    /// Duration of the segment in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        let secs = self.samples.len() as f64 / f64::from(self.sample_rate).max(1.0);
        (secs * 1000.0) as u64
    }

    /// Normalized `f32` samples for engines that expect them.
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
    }
}

/// Transcription output, produced by ASR and consumed by the wake detector
/// (Idle state) or the confidence scorer + classifier (Active state), per §3.
#[derive(Debug, Clone)]
pub struct Transcript {
    /// The transcribed text.
    pub text: String,
    /// Engine-reported confidence in `[0, 1]`, if the engine provides one.
    pub engine_confidence: Option<f32>,
    /// BCP-47-ish language tag reported by the engine (e.g. "en").
    pub language_tag: String,
    /// Duration of the source audio in milliseconds.
    pub duration_ms: u64,
    /// Time the original audio was captured (utterance start).
    pub audio_captured_at: Instant,
    /// Time the transcription completed.
    pub transcribed_at: Instant,
}

/// A single token emitted by the LLM during streaming generation.
#[derive(Debug, Clone)]
pub struct LlmToken {
    /// The decoded text fragment.
    pub text: String,
    /// Whether this is the final token in the response.
    pub is_end: bool,
}

/// A sentence accumulated from LLM tokens, ready for TTS.
#[derive(Debug, Clone)]
pub struct SentenceChunk {
    /// Complete sentence text.
    pub text: String,
    /// Whether this is the last sentence in the response.
    pub is_final: bool,
}

/// Synthesized audio from TTS, ready for playback.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Normalized `f32` audio samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Whether this is the last chunk of the current response.
    pub is_final: bool,
}
