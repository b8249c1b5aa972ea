//! Audio subsystem: microphone capture with silence-aware stop for voice
//! input, and the CPR pacing click on the output side.
//!
//! Capture is framed, classified speech/silence per frame, resampled to
//! 16 kHz mono (what the transcriber expects), and returned when the
//! trailing-silence timer fires.

/// Sample rate the transcriber consumes.
pub const TARGET_RATE: u32 = 16_000;

mod capture;
mod metronome;
mod recorder;
mod resample;
#[cfg(test)]
mod tests;
mod vad;

pub use capture::{capture_from_pcm, CaptureOutcome, CaptureStats, StopReason};
pub use metronome::{ClickWave, Metronome};
pub use recorder::Recorder;
pub use vad::{EnergyVad, VadDecision, VadEngine, VadSmoother};
