//! Text-to-speech adapter contract (C13).
//!
//! The concrete synthesis model is an out-of-scope external collaborator
//! (§1); this module defines the narrow interface plus a text sanitizer
//! applied before any engine sees the text, and a sink reference
//! implementation that just captures what it was asked to say (§9: "sink
//! TTS that captures text").

pub mod sanitize;

use crate::error::{Result, TtsError};
use crate::pipeline::messages::SynthesizedAudio;
use parking_lot::Mutex;

/// A text-to-speech engine (§4.13).
pub trait TtsEngine: Send {
    /// Synthesize `text` to a single complete audio buffer.
    ///
    /// # Errors
    ///
    /// Returns [`TtsError::Synthesis`] if synthesis fails, or
    /// [`TtsError::VoiceUnavailable`] if the requested voice doesn't exist.
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio>;

    /// Synthesize `text` as a sequence of sentence-chunked buffers, for
    /// engines that support incremental playback. Default falls back to one
    /// complete buffer.
    ///
    /// # Errors
    ///
    /// Same as [`Self::synthesize`].
    fn synthesize_streaming(&mut self, text: &str) -> Result<Vec<SynthesizedAudio>> {
        Ok(vec![self.synthesize(text)?])
    }

    /// Release any engine-held resources (e.g. a loaded model). Idempotent.
    fn cleanup(&mut self) {}
}

/// Sink reference implementation: captures the sanitized text it was asked
/// to speak instead of producing real audio, for use in tests and in the
/// FSM round-trip/idempotency checks (§8, §9).
#[derive(Default)]
pub struct SinkTtsEngine {
    spoken: Mutex<Vec<String>>,
    sample_rate: u32,
}

impl SinkTtsEngine {
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            spoken: Mutex::new(Vec::new()),
            sample_rate,
        }
    }

    /// All text this engine has been asked to speak, in call order.
    #[must_use]
    pub fn spoken_history(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

impl TtsEngine for SinkTtsEngine {
    fn synthesize(&mut self, text: &str) -> Result<SynthesizedAudio> {
        let sanitized = sanitize::sanitize(text);
        if sanitized.is_empty() {
            return Err(TtsError::Synthesis("empty text after sanitization".into()).into());
        }
        self.spoken.lock().push(sanitized.clone());
        // One silent "sample" per character stands in for real audio
        // duration so tests can assert on length without a real engine.
        Ok(SynthesizedAudio {
            samples: vec![0.0; sanitized.len()],
            sample_rate: self.sample_rate,
            is_final: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesize_records_sanitized_text() {
        let mut engine = SinkTtsEngine::new(16_000);
        engine.synthesize("**hello** world").unwrap();
        assert_eq!(engine.spoken_history(), vec!["hello world".to_owned()]);
    }

    #[test]
    fn empty_text_is_rejected() {
        let mut engine = SinkTtsEngine::new(16_000);
        let result = engine.synthesize("   ");
        assert!(result.is_err());
    }

    #[test]
    fn streaming_default_falls_back_to_single_chunk() {
        let mut engine = SinkTtsEngine::new(16_000);
        let chunks = engine.synthesize_streaming("hi there").unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_final);
    }
}
