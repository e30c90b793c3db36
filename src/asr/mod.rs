//! Speech-to-text adapter contract (C3).
//!
//! The concrete recognition model is an out-of-scope external collaborator
//! (§1); this module defines the narrow interface the pipeline talks to,
//! grounded on the teacher's own STT engine shape (model load on first use,
//! structured logging of segment characteristics, a `warmup` hook) without
//! committing to any particular runtime.

use crate::error::{AsrError, Result};
use crate::pipeline::messages::{Transcript, Utterance};
use std::time::Instant;
use tracing::info;

/// A speech-to-text engine (§4.3).
///
/// Implementations may load their model lazily on first [`Self::transcribe`]
/// call, or eagerly via [`Self::warmup`].
pub trait AsrEngine: Send {
    /// Transcribe a complete utterance.
    ///
    /// # Errors
    ///
    /// Returns [`AsrError::NoSpeech`] if no recognizable speech is found, or
    /// [`AsrError::Decoder`] on an internal decoding failure.
    fn transcribe(&mut self, utterance: &Utterance) -> Result<Transcript>;

    /// Hint the target language for the next transcription, if the engine
    /// supports language selection. Default is a no-op for single-language
    /// engines.
    fn set_language(&mut self, _language_tag: &str) {}

    /// Eagerly load the model so the first real transcription isn't slowed
    /// by lazy initialization.
    ///
    /// # Errors
    ///
    /// Returns [`AsrError::ModelNotLoaded`] if loading fails.
    fn warmup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A scripted, in-memory [`AsrEngine`] for tests and for running the
/// pipeline without a real recognition model. Returns transcripts from a
/// fixed script in call order, falling back to [`AsrError::NoSpeech`] once
/// exhausted.
pub struct ScriptedAsrEngine {
    script: Vec<String>,
    cursor: usize,
    loaded: bool,
}

impl ScriptedAsrEngine {
    /// Build an engine that returns `script` entries in order, one per call.
    #[must_use]
    pub fn new(script: Vec<String>) -> Self {
        Self {
            script,
            cursor: 0,
            loaded: false,
        }
    }
}

impl AsrEngine for ScriptedAsrEngine {
    fn transcribe(&mut self, utterance: &Utterance) -> Result<Transcript> {
        if !self.loaded {
            return Err(AsrError::ModelNotLoaded.into());
        }
        let text = self
            .script
            .get(self.cursor)
            .cloned()
            .ok_or(AsrError::NoSpeech)?;
        self.cursor += 1;
        info!("scripted ASR returning: \"{text}\"");
        Ok(Transcript {
            text,
            engine_confidence: Some(0.95),
            language_tag: "en".to_owned(),
            duration_ms: utterance.duration_ms(),
            audio_captured_at: utterance.started_at,
            transcribed_at: Instant::now(),
        })
    }

    fn warmup(&mut self) -> Result<()> {
        self.loaded = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance() -> Utterance {
        let now = Instant::now();
        Utterance {
            samples: vec![0i16; 16_000],
            sample_rate: 16_000,
            started_at: now,
            ended_at: now,
        }
    }

    #[test]
    fn requires_warmup_before_transcribe() {
        let mut engine = ScriptedAsrEngine::new(vec!["hello".to_owned()]);
        let err = engine.transcribe(&utterance());
        assert!(matches!(
            err,
            Err(crate::error::AssistantError::Asr(AsrError::ModelNotLoaded))
        ));
    }

    #[test]
    fn returns_script_entries_in_order() {
        let mut engine = ScriptedAsrEngine::new(vec!["one".to_owned(), "two".to_owned()]);
        engine.warmup().unwrap();
        assert_eq!(engine.transcribe(&utterance()).unwrap().text, "one");
        assert_eq!(engine.transcribe(&utterance()).unwrap().text, "two");
    }

    #[test]
    fn exhausted_script_yields_no_speech() {
        let mut engine = ScriptedAsrEngine::new(vec![]);
        engine.warmup().unwrap();
        let err = engine.transcribe(&utterance());
        assert!(matches!(
            err,
            Err(crate::error::AssistantError::Asr(AsrError::NoSpeech))
        ));
    }
}
