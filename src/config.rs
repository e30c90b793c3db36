//! Configuration types for the voice assistant pipeline.
//!
//! Mirrors the teacher's per-subsystem `Default + Serialize + Deserialize`
//! config struct convention. Parsing a config file from disk is out of
//! scope (§1) — callers construct these however they like (defaults,
//! deserialized TOML/JSON, hand-built) and pass the aggregate to
//! [`crate::pipeline::coordinator::ConversationCoordinator::new`].

use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the voice assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub audio: AudioConfig,
    pub wake: WakeConfig,
    pub conversation: ConversationConfig,
    pub context: ContextConfig,
    pub cache: CacheConfig,
    pub tools: ToolConfig,
    pub rag: RagConfig,
    pub llm: LlmConfig,
}

impl AssistantConfig {
    /// Validate cross-cutting invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if any system prompt template exceeds 50 lines
    /// (§4.12) or any numeric field is out of its documented range.
    pub fn validate(&self) -> Result<()> {
        for (name, template) in self.llm.system_prompt_templates() {
            if template.lines().count() > 50 {
                return Err(AssistantError::Config(format!(
                    "system prompt template '{name}' exceeds 50 lines"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.wake.sensitivity) {
            return Err(AssistantError::Config(
                "wake.sensitivity must be in [0, 1]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rag.min_confidence) {
            return Err(AssistantError::Config(
                "rag.min_confidence must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Audio capture/playback configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device index; `None` uses the system default.
    pub mic_index: Option<u32>,
    /// Sample rate in Hz for capture and VAD.
    pub sample_rate: u32,
    /// RMS energy threshold seed (overridden by calibration, §4.1).
    pub energy_threshold: i32,
    /// Seconds with no detected speech start before `CaptureTimeout`.
    pub timeout_s: f32,
    /// Maximum phrase duration in seconds before a segment is forced closed.
    pub phrase_time_limit_s: f32,
    /// Guard interval after playback settles before re-arming the listener.
    pub response_delay_s: f32,
    /// Fixed frame size in milliseconds (20-30ms per §4.1).
    pub frame_ms: u32,
    /// Consecutive above-threshold frames required to start a segment.
    pub k_start: u32,
    /// Consecutive below-threshold frames required to end a segment.
    pub k_end: u32,
    /// Segments shorter than this are discarded silently.
    pub min_utterance_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            mic_index: None,
            sample_rate: 16_000,
            energy_threshold: 50,
            timeout_s: 3.0,
            phrase_time_limit_s: 5.0,
            response_delay_s: 0.5,
            frame_ms: 20,
            k_start: 3,
            k_end: 8,
            min_utterance_ms: 250,
        }
    }
}

/// Wake word detection configuration (§4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Wake word set; first entry is the "primary" word for ack phrasing.
    pub words: Vec<String>,
    /// Minimum score to count as a detection.
    pub sensitivity: f32,
    /// Short timeout per wake-listening attempt, in seconds (§5).
    pub listen_timeout_s: f32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            words: vec!["jarvis".to_owned()],
            sensitivity: 0.8,
            listen_timeout_s: 2.0,
        }
    }
}

/// Conversation session/retry configuration (§4.15, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Seconds since the last user utterance before the session ends.
    pub timeout_s: u32,
    /// Maximum retries on recoverable errors before giving up to `Idle`.
    pub max_retries: u32,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            timeout_s: 30,
            max_retries: 3,
        }
    }
}

/// Context window configuration (§4.9, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_tokens: usize,
    pub max_entries: usize,
    pub compression_threshold: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            max_entries: 50,
            compression_threshold: 0.8,
        }
    }
}

/// Response cache configuration (§4.8, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_memory_mb: f64,
    pub persistence: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_memory_mb: 500.0,
            persistence: true,
        }
    }
}

/// Tool selection configuration (§4.10, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub max_per_query: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self { max_per_query: 3 }
    }
}

/// RAG gate configuration (§4.11, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub min_confidence: f32,
    pub enabled: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            enabled: true,
        }
    }
}

/// Per-complexity hard wall-clock timeouts, in seconds (§5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityTimeouts {
    pub instant_s: f32,
    pub explicit_fact_s: f32,
    pub simple_reasoning_s: f32,
    pub complex_multi_step_s: f32,
}

impl Default for ComplexityTimeouts {
    fn default() -> Self {
        Self {
            instant_s: 0.5,
            explicit_fact_s: 1.0,
            simple_reasoning_s: 5.0,
            complex_multi_step_s: 30.0,
        }
    }
}

/// LLM endpoint configuration (§4.12, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-style chat completion endpoint.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeouts: ComplexityTimeouts,
    /// System prompt template per complexity tier; validated at init (≤50 lines).
    pub instant_prompt: String,
    pub simple_prompt: String,
    pub complex_prompt: String,
    pub fallback_prompt: String,
}

impl LlmConfig {
    /// Iterate the four named system prompt templates for validation.
    pub fn system_prompt_templates(&self) -> [(&'static str, &str); 4] {
        [
            ("instant", &self.instant_prompt),
            ("simple", &self.simple_prompt),
            ("complex", &self.complex_prompt),
            ("fallback", &self.fallback_prompt),
        ]
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/v1/chat/completions".to_owned(),
            model: "local-model".to_owned(),
            temperature: 0.7,
            max_tokens: 4096,
            timeouts: ComplexityTimeouts::default(),
            instant_prompt: "You are a terse voice assistant. Answer in one short sentence."
                .to_owned(),
            simple_prompt:
                "You are a helpful voice assistant. Answer briefly and conversationally."
                    .to_owned(),
            complex_prompt: "You are a capable voice assistant with tool access. Plan, use tools \
                              as needed, and explain results briefly."
                .to_owned(),
            fallback_prompt: "You are a voice assistant. Respond helpfully.".to_owned(),
        }
    }
}
