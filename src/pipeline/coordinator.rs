//! Conversation state machine orchestrating C1-C14 (C15).
//!
//! Grounded on the teacher's `pipeline/coordinator.rs` composition-root
//! shape: named channel-size constants (§5), a single-task pipeline worker
//! per session, and `tokio::select!`-driven cancellation. The teacher's
//! barge-in/queueing machinery is dropped per the explicit non-goal
//! (full-duplex interruption of in-flight TTS is disabled, §1) — this
//! coordinator instead serializes one command at a time and suppresses
//! self-heard transcripts while speaking (§4.15 invariant 5).

use crate::agent::{detect_memory_store_intent, AgentInvoker};
use crate::asr::AsrEngine;
use crate::audio::capture::AudioCapture;
use crate::audio::playback::AudioPlayer;
use crate::cache::ResponseCache;
use crate::classifier::{Classification, Classifier};
use crate::confidence::{ConfidenceLevel, ConfidenceScorer};
use crate::config::AssistantConfig;
use crate::context::{ContextEntry, ContextWindow, EntryKind, Priority};
use crate::error::{AssistantError, Result};
use crate::instant::InstantHandler;
use crate::pipeline::messages::{PcmFrame, Transcript, Utterance};
use crate::rag::{MemoryService, RagGate};
use crate::tools::registry::ToolRegistry;
use crate::tools::selector::ToolSelector;
use crate::tts::TtsEngine;
use crate::vad::{calibrate_noise_floor, EnergyVad};
use crate::wake::WakeDetector;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Channel size between capture and VAD (§5, distinct from the capture
/// callback's own bounded channel which has its own constant in
/// `audio::capture`).
pub const FRAME_CHANNEL_SIZE: usize = 8;
/// How often `process_loop` polls for a new frame when none has arrived, so
/// `EnergyVad::check_timeout` gets a chance to fire even during silence
/// (§4.2 CaptureTimeout).
const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Channel size between VAD and the ASR worker (§5: back-pressures VAD to
/// drop the oldest pending utterance if full).
pub const UTTERANCE_CHANNEL_SIZE: usize = 2;

/// Conversation state (§3). At most one state is active at a time; the
/// coordinator mutates its own `state` field as the single source of truth
/// (invariant 6, §8: transitions are a subset of this diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    ListeningForWakeWord,
    WakeWordDetected,
    ListeningForCommand,
    ProcessingCommand,
    Responding,
    Error,
}

/// Outcome of processing one recognized command, used by tests and by the
/// `run` loop to decide what to speak next.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub response_text: String,
    pub used_llm: bool,
    pub classification: Option<Classification>,
}

/// Orchestrates the wake/command state machine end to end (§4.15).
pub struct ConversationCoordinator {
    config: AssistantConfig,
    state: ConversationState,
    retry_count: u32,

    wake: WakeDetector,
    confidence: ConfidenceScorer,
    classifier: Classifier,
    instant: InstantHandler,
    cache: ResponseCache,
    context: ContextWindow,
    tools: ToolRegistry,
    selector: ToolSelector,
    rag: RagGate,
    agent: AgentInvoker,

    asr: Box<dyn AsrEngine>,
    tts: Box<dyn TtsEngine>,
    memory: Box<dyn MemoryService>,

    /// Playback window during which captured transcripts are self-heard
    /// assistant speech and must be dropped (§4.15, invariant 5 §8).
    tts_active_window: Option<(Instant, Instant)>,
    last_user_utterance_at: Instant,
}

impl ConversationCoordinator {
    #[must_use]
    pub fn new(
        config: AssistantConfig,
        mut asr: Box<dyn AsrEngine>,
        tts: Box<dyn TtsEngine>,
        memory: Box<dyn MemoryService>,
    ) -> Self {
        if let Err(e) = asr.warmup() {
            warn!("ASR warmup failed, will retry lazily on first utterance: {e}");
        }
        let wake = WakeDetector::new(&config.wake);
        let confidence = ConfidenceScorer::new();
        let classifier = Classifier::new();
        let instant = InstantHandler::new(None);
        let cache = ResponseCache::new(&config.cache);
        let context = ContextWindow::new(&config.context);
        let tools = ToolRegistry::new();
        let selector = ToolSelector::new();
        let rag = RagGate::new(&config.rag);
        let agent = AgentInvoker::new(config.llm.clone());

        Self {
            config,
            state: ConversationState::Idle,
            retry_count: 0,
            wake,
            confidence,
            classifier,
            instant,
            cache,
            context,
            tools,
            selector,
            rag,
            agent,
            asr,
            tts,
            memory,
            tts_active_window: None,
            last_user_utterance_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Tool registry, for pre-registering tools before `run` starts.
    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// Whether a transcript captured at `captured_at` falls inside the
    /// current TTS playback window and must be discarded (§4.15 invariant 5).
    fn is_self_heard(&self, captured_at: Instant) -> bool {
        match self.tts_active_window {
            Some((start, end)) => captured_at >= start && captured_at <= end,
            None => false,
        }
    }

    /// Handle one transcript according to the current state. This is the
    /// pure decision core of the FSM; `run` wires it to real audio/ASR
    /// channels.
    pub async fn handle_transcript(&mut self, transcript: Transcript) -> Option<RouteOutcome> {
        if self.is_self_heard(transcript.audio_captured_at) {
            info!("discarding self-heard transcript during TTS playback");
            return None;
        }

        match self.state {
            ConversationState::Idle | ConversationState::ListeningForWakeWord => {
                let detection = self.wake.process_transcript(&transcript);
                if detection.detected {
                    self.state = ConversationState::WakeWordDetected;
                    self.context = ContextWindow::new(&self.config.context);
                    self.state = ConversationState::ListeningForCommand;
                    self.last_user_utterance_at = Instant::now();
                    Some(RouteOutcome {
                        response_text: "Yes?".to_owned(),
                        used_llm: false,
                        classification: None,
                    })
                } else {
                    self.state = ConversationState::ListeningForWakeWord;
                    None
                }
            }
            ConversationState::ListeningForCommand => {
                self.last_user_utterance_at = Instant::now();
                // Seed scenario boundary case: a bare wake word alone in the
                // command state is ignored, not treated as a command (§8).
                if self.wake.detect_in_text(&transcript.text).detected
                    && transcript.text.split_whitespace().count() <= 2
                {
                    return None;
                }
                self.state = ConversationState::ProcessingCommand;
                let outcome = self.process_command(&transcript).await;
                self.state = ConversationState::Responding;
                Some(outcome)
            }
            _ => None,
        }
    }

    /// Run the router pipeline for one recognized command (§4.6-§4.12).
    async fn process_command(&mut self, transcript: &Transcript) -> RouteOutcome {
        let confidence_report = self.confidence.score(transcript);
        if matches!(confidence_report.level, ConfidenceLevel::Low | ConfidenceLevel::VeryLow) {
            let clarification = confidence_report
                .suggestions
                .first()
                .cloned()
                .unwrap_or_else(|| "Could you say that again?".to_owned());
            return RouteOutcome {
                response_text: clarification,
                used_llm: false,
                classification: None,
            };
        }

        if let Some(fact) = detect_memory_store_intent(&transcript.text) {
            let confirmation = match self.memory.store_fact(&fact).await {
                Ok(()) => format!("Okay, I'll remember that {fact}."),
                Err(e) => {
                    warn!("memory store failed: {e}");
                    format!("I heard \"{fact}\" but couldn't save it right now.")
                }
            };
            return RouteOutcome {
                response_text: confirmation,
                used_llm: false,
                classification: None,
            };
        }

        if let Some(response) = self.instant.handle(&transcript.text, &self.tools) {
            self.record_turn(&transcript.text, &response);
            return RouteOutcome {
                response_text: response,
                used_llm: false,
                classification: None,
            };
        }

        let classification = self.classifier.classify(&transcript.text);
        let max_tools = classification
            .complexity
            .max_tools()
            .min(self.config.tools.max_per_query);
        let selected_tools = self.selector.select(
            &self.tools,
            &transcript.text,
            max_tools,
            classification.complexity,
        );

        let memory_exists = self.memory.has_any_facts().await.unwrap_or(false);
        let rag_hits = self
            .rag
            .retrieve(
                self.memory.as_ref(),
                &transcript.text,
                classification.confidence,
                classification.complexity,
                memory_exists,
            )
            .await;

        let response = match self
            .agent
            .invoke(
                &transcript.text,
                classification.complexity,
                &selected_tools,
                &self.tools,
                &self.context,
                &rag_hits,
                &self.cache,
            )
            .await
        {
            Ok(agent_response) => agent_response.text,
            Err(e) => {
                warn!("agent invocation failed: {e}");
                self.agent.apology_response()
            }
        };

        self.record_turn(&transcript.text, &response);

        RouteOutcome {
            response_text: response,
            used_llm: true,
            classification: Some(classification),
        }
    }

    fn record_turn(&mut self, user_text: &str, assistant_text: &str) {
        self.context.add(ContextEntry::new(
            user_text,
            Priority::Medium,
            EntryKind::UserUtterance,
        ));
        self.context.add(ContextEntry::new(
            assistant_text,
            Priority::Medium,
            EntryKind::AssistantReply,
        ));
    }

    /// Speak `text` through `player`, marking the TTS-active window for
    /// feedback suppression and returning to `ListeningForCommand` once
    /// playback settles (§4.15). Playback failures are logged and otherwise
    /// non-fatal (§7: "PlaybackError -> log and return to listening").
    pub fn speak(&mut self, player: &mut AudioPlayer, text: &str) -> Result<()> {
        let audio = self.tts.synthesize(text)?;
        let start = Instant::now();
        if let Err(e) = player.speak(&audio.samples, true) {
            warn!("playback failed, continuing: {e}");
        }
        let end = Instant::now();
        self.tts_active_window = Some((start, end));
        self.state = ConversationState::ListeningForCommand;
        Ok(())
    }

    /// Clear the TTS-active window and enforce the post-playback guard
    /// interval before the command listener re-arms (§4.15).
    pub async fn settle_after_playback(&mut self) {
        tokio::time::sleep(Duration::from_secs_f32(self.config.audio.response_delay_s)).await;
        self.tts_active_window = None;
    }

    /// Whether the session has been idle long enough to return to `Idle`
    /// (§4.15 session timeout).
    #[must_use]
    pub fn session_expired(&self) -> bool {
        self.last_user_utterance_at.elapsed().as_secs() >= u64::from(self.config.conversation.timeout_s)
    }

    pub fn return_to_idle(&mut self) {
        self.state = ConversationState::Idle;
        self.retry_count = 0;
    }

    /// Record a recoverable failure; returns `true` if `max_retries` has
    /// been exceeded and the FSM should give up to `Idle` (§4.15, §7).
    pub fn record_retryable_failure(&mut self) -> bool {
        self.retry_count += 1;
        self.retry_count > self.config.conversation.max_retries
    }

    /// Main run loop: captures audio, frames utterances, transcribes, and
    /// drives the state machine until `cancel` fires (§5 FSM driver).
    ///
    /// # Errors
    ///
    /// Returns an error only on a fatal condition (`AudioDeviceUnavailable`,
    /// §7); all other failures are handled locally and logged.
    pub async fn run(
        &mut self,
        capture: &AudioCapture,
        player: &mut AudioPlayer,
        cancel: CancellationToken,
    ) -> Result<()> {
        let (frame_tx, frame_rx) = mpsc::channel::<PcmFrame>(FRAME_CHANNEL_SIZE);
        let capture_fut = capture.run(frame_tx, cancel.clone());
        let process_fut = self.process_loop(frame_rx, player, cancel.clone());
        let (capture_result, process_result) = tokio::join!(capture_fut, process_fut);
        process_result?;
        capture_result
    }

    async fn process_loop(
        &mut self,
        mut frame_rx: mpsc::Receiver<PcmFrame>,
        player: &mut AudioPlayer,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut calibration_frames = Vec::new();
        while calibration_frames.len() < 50 {
            match frame_rx.recv().await {
                Some(frame) => calibration_frames.push(frame),
                None => break,
            }
        }
        let noise_floor = calibrate_noise_floor(&calibration_frames);
        let mut vad = EnergyVad::new(&self.config.audio, noise_floor);
        vad.arm();

        self.state = ConversationState::ListeningForWakeWord;

        let capture_timeout = Duration::from_secs_f32(self.config.audio.timeout_s);

        loop {
            if cancel.is_cancelled() {
                break;
            }
            if self.state != ConversationState::Responding && self.session_expired() {
                self.return_to_idle();
            }

            let frame = match tokio::time::timeout(CAPTURE_POLL_INTERVAL, frame_rx.recv()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_elapsed) => {
                    // No frame arrived within the poll interval; check whether
                    // speech has failed to start within the capture timeout
                    // (§4.2, §7 CaptureTimeout) and re-arm if so.
                    if vad.check_timeout(Instant::now(), capture_timeout).is_err() {
                        vad.arm();
                    }
                    continue;
                }
            };

            let vad_output = vad.process_frame(&frame);
            let Some(utterance) = vad_output.segment else {
                continue;
            };

            match self.transcribe(&utterance) {
                Ok(transcript) => {
                    if let Some(outcome) = self.handle_transcript(transcript).await {
                        if let Err(e) = self.speak(player, &outcome.response_text) {
                            warn!("failed to speak response: {e}");
                        }
                        self.settle_after_playback().await;
                        vad.arm();
                    }
                }
                Err(AssistantError::Asr(crate::error::AsrError::NoSpeech)) => {
                    vad.arm();
                }
                Err(e) => {
                    warn!("ASR error: {e}");
                    if self.record_retryable_failure() {
                        if let Err(e) = self.speak(player, "I'm having trouble understanding.") {
                            warn!("failed to speak error response: {e}");
                        }
                        self.return_to_idle();
                    }
                    vad.arm();
                }
            }
        }

        Ok(())
    }

    fn transcribe(&mut self, utterance: &Utterance) -> Result<Transcript> {
        self.asr.transcribe(utterance)
    }
}
