//! Voice Activity Detection and utterance framing (C2).
//!
//! Groups [`PcmFrame`]s into [`Utterance`]s using an adaptive energy
//! threshold and consecutive-frame start/end rules (§4.2). The threshold is
//! seeded from an ambient-noise calibration pass (§4.1) and then tracked by
//! an exponential moving average of frame energies that fall below a
//! "speech-suspect" ceiling, so slow drift in room noise doesn't erode
//! detection quality over a long session.

use crate::config::AudioConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::{PcmFrame, Utterance};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// VAD processing output for a single frame.
pub struct VadOutput {
    /// Whether this frame started a new speech segment.
    pub speech_started: bool,
    /// Whether this frame is classified as speech.
    pub is_speech: bool,
    /// Completed utterance, if one ended (or was force-closed) on this frame.
    pub segment: Option<Utterance>,
    /// RMS energy of the processed frame.
    pub rms: f32,
}

/// Energy-threshold VAD with adaptive noise floor tracking.
pub struct EnergyVad {
    sample_rate: u32,
    /// Current adaptive threshold, seeded by calibration and updated by EMA.
    threshold: f32,
    /// Smoothing factor for the noise-floor EMA (smaller = slower drift).
    ema_alpha: f32,
    /// A frame only updates the noise floor if its RMS stays below this
    /// "speech-suspect" ceiling — keeps loud speech from inflating the floor.
    speech_suspect_ceiling: f32,
    k_start: u32,
    k_end: u32,
    above_run: u32,
    below_run: u32,
    in_speech: bool,
    speech_buffer: Vec<i16>,
    speech_start: Option<Instant>,
    min_utterance_samples: usize,
    phrase_time_limit_samples: usize,
    listening_since: Instant,
}

impl EnergyVad {
    /// Create a VAD seeded by a calibration RMS reading (§4.1).
    #[must_use]
    pub fn new(config: &AudioConfig, calibrated_noise_rms: f32) -> Self {
        let samples_per_ms = config.sample_rate as f32 / 1000.0;
        let seed_threshold = (calibrated_noise_rms * 3.0).max(0.005);
        info!(
            "VAD initialized: seed_threshold={:.4}, k_start={}, k_end={}, min_utterance={}ms",
            seed_threshold, config.k_start, config.k_end, config.min_utterance_ms
        );
        Self {
            sample_rate: config.sample_rate,
            threshold: seed_threshold,
            ema_alpha: 0.05,
            speech_suspect_ceiling: seed_threshold * 1.5,
            k_start: config.k_start,
            k_end: config.k_end,
            above_run: 0,
            below_run: 0,
            in_speech: false,
            speech_buffer: Vec::new(),
            speech_start: None,
            min_utterance_samples: (config.min_utterance_ms as f32 * samples_per_ms) as usize,
            phrase_time_limit_samples: (config.phrase_time_limit_s * 1000.0 * samples_per_ms)
                as usize,
            listening_since: Instant::now(),
        }
    }

    /// Reset the "no speech yet" clock used by [`Self::check_timeout`].
    pub fn arm(&mut self) {
        self.listening_since = Instant::now();
    }

    /// Returns `Err(CaptureTimeout)` if no speech start has been seen within
    /// `timeout` since the last [`Self::arm`] call (§4.2).
    pub fn check_timeout(&self, now: Instant, timeout: Duration) -> Result<()> {
        if !self.in_speech && now.duration_since(self.listening_since) >= timeout {
            return Err(AssistantError::CaptureTimeout(timeout));
        }
        Ok(())
    }

    /// Process one frame, returning a completed utterance if a segment ended.
    pub fn process_frame(&mut self, frame: &PcmFrame) -> VadOutput {
        let samples_f32 = frame.to_f32();
        let rms = compute_rms_energy(&samples_f32);
        let is_speech = rms > self.threshold;

        if !is_speech && rms <= self.speech_suspect_ceiling {
            self.threshold = self.threshold * (1.0 - self.ema_alpha) + rms * 3.0 * self.ema_alpha;
        }

        let mut speech_started = false;
        let mut completed = None;

        if is_speech {
            self.above_run += 1;
            self.below_run = 0;
            if !self.in_speech && self.above_run >= self.k_start {
                self.in_speech = true;
                speech_started = true;
                self.speech_start = Some(frame.captured_at);
                self.speech_buffer.clear();
            }
            if self.in_speech {
                self.speech_buffer.extend_from_slice(&frame.samples);
            }
        } else {
            self.below_run += 1;
            self.above_run = 0;
            if self.in_speech {
                self.speech_buffer.extend_from_slice(&frame.samples);
                if self.below_run >= self.k_end {
                    completed = self.finish_segment(frame.captured_at);
                }
            }
        }

        if self.in_speech && self.speech_buffer.len() >= self.phrase_time_limit_samples {
            completed = self.finish_segment(frame.captured_at);
        }

        VadOutput {
            speech_started,
            is_speech,
            segment: completed,
            rms,
        }
    }

    fn finish_segment(&mut self, ended_at: Instant) -> Option<Utterance> {
        self.in_speech = false;
        self.below_run = 0;
        self.above_run = 0;
        let started_at = self.speech_start.take().unwrap_or(ended_at);
        let samples = std::mem::take(&mut self.speech_buffer);
        if samples.len() < self.min_utterance_samples {
            return None;
        }
        Some(Utterance {
            samples,
            sample_rate: self.sample_rate,
            started_at,
            ended_at,
        })
    }

    /// Force-close any in-progress segment (e.g. on session teardown).
    pub fn reset(&mut self) {
        self.speech_buffer.clear();
        self.in_speech = false;
        self.above_run = 0;
        self.below_run = 0;
        self.speech_start = None;
    }
}

/// Sample ambient noise to seed the VAD threshold (§4.1, a ~1s calibration
/// pass at startup).
#[must_use]
pub fn calibrate_noise_floor(frames: &[PcmFrame]) -> f32 {
    if frames.is_empty() {
        return 0.005;
    }
    let mut buf: VecDeque<f32> = VecDeque::new();
    for frame in frames {
        buf.extend(frame.to_f32());
    }
    let samples: Vec<f32> = buf.into_iter().collect();
    compute_rms_energy(&samples)
}

fn compute_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
