//! Microphone audio capture via cpal (C1).
//!
//! Opens the configured input device; if that fails, falls back to the
//! first enumerated input device that opens successfully (§4.1). Emits a
//! lazy, effectively-infinite sequence of fixed-size [`PcmFrame`]s over a
//! bounded channel. The real-time audio callback never blocks on an async
//! channel: it pushes into a small ring buffer, evicting the OLDEST pending
//! frame (not the newest) when the ring is full, and increments a drop
//! counter (§5). A separate forwarding task drains the ring into the bounded
//! `tokio::mpsc` channel the rest of the pipeline consumes.

use crate::config::AudioConfig;
use crate::error::{AssistantError, Result};
use crate::pipeline::messages::PcmFrame;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bounded channel size between the audio callback and VAD (§5).
pub const CAPTURE_CHANNEL_SIZE: usize = 8;

/// Ring buffer shared between the real-time audio callback and the async
/// forwarding task, decoupling the callback from the `tokio::mpsc` channel
/// so overflow always drops the oldest frame (§5, §7).
struct FrameRing {
    buffer: Mutex<VecDeque<PcmFrame>>,
    capacity: usize,
    notify: Notify,
}

impl FrameRing {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Push a frame, evicting the oldest pending one first if full.
    fn push(&self, frame: PcmFrame, dropped: &AtomicU64) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() >= self.capacity {
                buffer.pop_front();
                dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(frame);
        }
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<PcmFrame> {
        self.buffer.lock().drain(..).collect()
    }
}

/// Microphone capture stage.
pub struct AudioCapture {
    device: cpal::Device,
    stream_config: StreamConfig,
    target_sample_rate: u32,
    target_frame_samples: usize,
    /// Frames dropped because the downstream channel was full.
    dropped_frames: std::sync::Arc<AtomicU64>,
}

impl AudioCapture {
    /// Open the configured device, or the first input device that opens if
    /// the configured one is unavailable or unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`AssistantError::AudioDeviceUnavailable`] if no input device
    /// opens at all.
    pub fn open(config: &AudioConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_input_device(&host, config.mic_index)?;

        let device_name = device.name().unwrap_or_else(|_| "<unknown>".into());
        info!("using input device: {device_name}");

        let default_config = device.default_input_config().map_err(|e| {
            AssistantError::AudioDeviceUnavailable(format!("no default input config: {e}"))
        })?;

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: default_config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let frame_samples =
            (config.frame_ms as f32 / 1000.0 * config.sample_rate as f32) as usize;

        Ok(Self {
            device,
            stream_config,
            target_sample_rate: config.sample_rate,
            target_frame_samples: frame_samples.max(1),
            dropped_frames: std::sync::Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of frames dropped so far due to a full downstream channel.
    #[must_use]
    pub fn dropped_frame_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Run the capture loop, sending fixed-size frames until `cancel` fires.
    ///
    /// Stopping is cooperative and bounded: once cancelled, at most one
    /// in-flight frame is drained before the device closes (§4.1).
    ///
    /// # Errors
    ///
    /// Returns an error if the input stream cannot be built or started.
    pub async fn run(&self, tx: mpsc::Sender<PcmFrame>, cancel: CancellationToken) -> Result<()> {
        let native_rate = self.stream_config.sample_rate.0;
        let native_channels = self.stream_config.channels;
        let target_rate = self.target_sample_rate;
        let frame_len = self.target_frame_samples;
        let dropped = self.dropped_frames.clone();
        let mut pending: VecDeque<i16> = VecDeque::with_capacity(frame_len * 4);

        let ring = Arc::new(FrameRing::new(CAPTURE_CHANNEL_SIZE));
        let ring_cb = ring.clone();
        let dropped_cb = dropped.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.stream_config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    let mono = if native_channels > 1 {
                        to_mono(data, native_channels)
                    } else {
                        data.to_vec()
                    };
                    let resampled = if native_rate != target_rate {
                        resample_linear(&mono, native_rate, target_rate)
                    } else {
                        mono
                    };
                    pending.extend(resampled.iter().map(|&s| to_i16(s)));

                    while pending.len() >= frame_len {
                        let samples: Vec<i16> = pending.drain(..frame_len).collect();
                        let frame = PcmFrame {
                            samples,
                            sample_rate: target_rate,
                            captured_at: Instant::now(),
                        };
                        ring_cb.push(frame, &dropped_cb);
                    }
                },
                move |err| {
                    error!("audio input stream error: {err}");
                },
                None,
            )
            .map_err(|e| AssistantError::Audio(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AssistantError::Audio(format!("failed to start input stream: {e}")))?;

        info!("audio capture started: native {native_rate}Hz -> target {target_rate}Hz");

        let forward_ring = ring.clone();
        let forward_cancel = cancel.clone();
        loop {
            tokio::select! {
                () = forward_cancel.cancelled() => break,
                () = forward_ring.notify.notified() => {}
            }
            for frame in forward_ring.drain() {
                if tx.send(frame).await.is_err() {
                    debug!("capture channel closed; pipeline stopped");
                    break;
                }
            }
        }
        // Drain whatever the callback queued between the last notification
        // and cancellation so the final frames aren't silently lost.
        for frame in ring.drain() {
            if tx.send(frame).await.is_err() {
                break;
            }
        }

        drop(stream);
        info!(
            "audio capture stopped ({} frames dropped over session)",
            self.dropped_frames.load(Ordering::Relaxed)
        );
        Ok(())
    }
}

/// Select the configured input device, falling back to the first device
/// that opens successfully (§4.1).
fn select_input_device(host: &cpal::Host, mic_index: Option<u32>) -> Result<cpal::Device> {
    if let Some(idx) = mic_index {
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| {
                AssistantError::AudioDeviceUnavailable(format!("cannot enumerate devices: {e}"))
            })?
            .collect();
        if let Some(device) = devices.into_iter().nth(idx as usize) {
            if device.default_input_config().is_ok() {
                return Ok(device);
            }
            warn!("configured mic_index {idx} did not open, scanning other devices");
        } else {
            warn!("configured mic_index {idx} out of range, scanning other devices");
        }
    } else if let Some(device) = host.default_input_device() {
        if device.default_input_config().is_ok() {
            return Ok(device);
        }
    }

    let devices = host.input_devices().map_err(|e| {
        AssistantError::AudioDeviceUnavailable(format!("cannot enumerate devices: {e}"))
    })?;
    for device in devices {
        if device.default_input_config().is_ok() {
            return Ok(device);
        }
    }

    Err(AssistantError::AudioDeviceUnavailable(
        "no input device could be opened".into(),
    ))
}

fn to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Linear-interpolation resampler. Speech energy is below 8kHz, so no
/// anti-alias filter is needed for typical 48kHz -> 16kHz capture.
fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;
        let sample = if idx + 1 < samples.len() {
            f64::from(samples[idx]) * (1.0 - frac) + f64::from(samples[idx + 1]) * frac
        } else {
            f64::from(samples[idx.min(samples.len() - 1)])
        };
        output.push(sample as f32);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_i16_clamps_range() {
        assert_eq!(to_i16(2.0), i16::MAX);
        assert_eq!(to_i16(-2.0), -32767);
        assert_eq!(to_i16(0.0), 0);
    }

    #[test]
    fn to_mono_averages_channels() {
        let stereo = vec![1.0, -1.0, 0.5, 0.5];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn resample_linear_identity_when_same_rate() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 16_000, 16_000), samples);
    }

    #[test]
    fn resample_linear_downsamples_length() {
        let samples = vec![0.0; 480];
        let out = resample_linear(&samples, 48_000, 16_000);
        assert_eq!(out.len(), 160);
    }

    #[test]
    fn resample_linear_empty_input() {
        assert!(resample_linear(&[], 48_000, 16_000).is_empty());
    }

    fn ring_frame(marker: i16) -> PcmFrame {
        PcmFrame {
            samples: vec![marker],
            sample_rate: 16_000,
            captured_at: Instant::now(),
        }
    }

    #[test]
    fn ring_drops_oldest_frame_on_overflow() {
        let ring = FrameRing::new(2);
        let dropped = AtomicU64::new(0);
        ring.push(ring_frame(1), &dropped);
        ring.push(ring_frame(2), &dropped);
        ring.push(ring_frame(3), &dropped);

        let remaining = ring.drain();
        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].samples[0], 2);
        assert_eq!(remaining[1].samples[0], 3);
    }

    #[test]
    fn ring_drain_empties_the_buffer() {
        let ring = FrameRing::new(4);
        let dropped = AtomicU64::new(0);
        ring.push(ring_frame(1), &dropped);
        assert_eq!(ring.drain().len(), 1);
        assert!(ring.drain().is_empty());
    }
}
