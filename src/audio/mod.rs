//! Microphone capture and speaker playback (C1, C14).

pub mod capture;
pub mod playback;
