//! Error types for the conversational pipeline.
//!
//! One top-level enum per the taxonomy in spec §7, plus dedicated adapter
//! error enums for ASR and TTS (§4.3, §4.13) that convert into it. No
//! external-input path panics; every boundary returns a typed error here.

use thiserror::Error;

/// Top-level error type for the voice assistant pipeline.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// No input/output audio device could be opened. Fatal: the capture or
    /// playback loop cannot start.
    #[error("audio device unavailable: {0}")]
    AudioDeviceUnavailable(String),

    /// Audio stream I/O error once a device is open.
    #[error("audio error: {0}")]
    Audio(String),

    /// No speech start detected within the configured timeout.
    #[error("capture timeout after {0:?}")]
    CaptureTimeout(std::time::Duration),

    /// ASR adapter error, see [`AsrError`].
    #[error("ASR error: {0}")]
    Asr(#[from] AsrError),

    /// TTS adapter error, see [`TtsError`].
    #[error("TTS error: {0}")]
    Tts(#[from] TtsError),

    /// Playback device or buffer error.
    #[error("playback error: {0}")]
    Playback(String),

    /// LLM endpoint call failed or exceeded its timeout.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Tool invocation failed (surfaced to the LLM as a structured error).
    #[error("tool error: {0}")]
    Tool(String),

    /// Memory service call failed (RAG store/search/forget).
    #[error("memory service error: {0}")]
    Memory(String),

    /// Configuration is invalid (e.g. a system prompt template over budget).
    #[error("config error: {0}")]
    Config(String),

    /// Cache tier I/O or (de)serialization error.
    #[error("cache error: {0}")]
    Cache(String),

    /// Pipeline coordination error (channel closed, state invariant violated).
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Channel send/receive error between pipeline stages.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from an [`crate::asr::AsrEngine`] implementation (§4.3).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsrError {
    /// The engine has not finished loading its model yet.
    #[error("ASR model not loaded")]
    ModelNotLoaded,

    /// The decoder failed on this utterance.
    #[error("ASR decoder error: {0}")]
    Decoder(String),

    /// The utterance contained no recognizable speech.
    #[error("no speech detected")]
    NoSpeech,
}

/// Errors from a [`crate::tts::TtsEngine`] implementation (§4.13).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TtsError {
    /// The engine has not finished loading its model yet.
    #[error("TTS engine not loaded")]
    EngineNotLoaded,

    /// Synthesis failed for this text.
    #[error("TTS synthesis error: {0}")]
    Synthesis(String),

    /// The requested voice is not available.
    #[error("voice unavailable: {0}")]
    VoiceUnavailable(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistantError>;
