//! The silence-aware capture state machine.
//!
//! Tracks speech and silence durations frame by frame and decides when a
//! listening session ends: after the silence tail elapses (the silence
//! timer), at the hard duration cap, or on a manual stop.

use super::vad::{VadDecision, VadEngine, VadSmoother};
use crate::config::VoiceSettings;

/// Why capture ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The trailing-silence timer fired after speech.
    Silence { tail_ms: u64 },
    MaxDuration,
    ManualStop,
    Error(String),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::Silence { .. } => "silence",
            StopReason::MaxDuration => "max_duration",
            StopReason::ManualStop => "manual_stop",
            StopReason::Error(_) => "error",
        }
    }
}

/// Capture metrics for the timing log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub capture_ms: u64,
    pub speech_ms: u64,
    pub frames_processed: usize,
    pub frames_dropped: usize,
    pub stop: StopReason,
}

impl Default for CaptureStats {
    fn default() -> Self {
        Self {
            capture_ms: 0,
            speech_ms: 0,
            frames_processed: 0,
            frames_dropped: 0,
            stop: StopReason::MaxDuration,
        }
    }
}

/// Mono 16 kHz PCM plus metrics.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub audio: Vec<f32>,
    pub stats: CaptureStats,
}

/// Duration bookkeeping: the silence timer restarts on every speech frame
/// and only fires once a minimum amount of speech has been heard, so a quiet
/// room does not stop the session instantly.
pub(super) struct SilenceTimer {
    frame_ms: u64,
    silence_tail_ms: u64,
    min_speech_ms: u64,
    max_ms: u64,
    speech_ms: u64,
    silence_streak_ms: u64,
    total_ms: u64,
}

impl SilenceTimer {
    pub(super) fn new(settings: &VoiceSettings) -> Self {
        Self {
            frame_ms: settings.vad_frame_ms.clamp(5, 120),
            silence_tail_ms: settings.silence_tail_ms,
            min_speech_ms: settings.min_speech_ms,
            max_ms: settings.max_capture_ms,
            speech_ms: 0,
            silence_streak_ms: 0,
            total_ms: 0,
        }
    }

    pub(super) fn on_frame(&mut self, decision: VadDecision) -> Option<StopReason> {
        match decision {
            VadDecision::Speech => {
                self.speech_ms = self.speech_ms.saturating_add(self.frame_ms);
                self.silence_streak_ms = 0;
            }
            VadDecision::Silence => {
                self.silence_streak_ms = self.silence_streak_ms.saturating_add(self.frame_ms);
            }
            VadDecision::Uncertain => {
                self.silence_streak_ms = 0;
            }
        }
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);

        if self.total_ms >= self.max_ms {
            return Some(StopReason::MaxDuration);
        }
        if self.speech_ms >= self.min_speech_ms && self.silence_streak_ms >= self.silence_tail_ms {
            return Some(StopReason::Silence {
                tail_ms: self.silence_streak_ms,
            });
        }
        None
    }

    /// No frame arrived within one frame interval; time still passes.
    pub(super) fn on_idle(&mut self) -> Option<StopReason> {
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);
        (self.total_ms >= self.max_ms).then_some(StopReason::MaxDuration)
    }

    pub(super) fn total_ms(&self) -> u64 {
        self.total_ms
    }

    pub(super) fn speech_ms(&self) -> u64 {
        self.speech_ms
    }
}

/// Flat sample accumulator with a byte budget and trailing-silence trim.
pub(super) struct SampleSink {
    samples: Vec<f32>,
    max_samples: usize,
    lookback_samples: usize,
    trailing_silence: usize,
}

impl SampleSink {
    pub(super) fn new(settings: &VoiceSettings) -> Self {
        let per_ms = u64::from(settings.sample_rate) / 1000;
        Self {
            samples: Vec::new(),
            max_samples: (settings.buffer_ms * per_ms).max(1) as usize,
            lookback_samples: (settings.lookback_ms * per_ms) as usize,
            trailing_silence: 0,
        }
    }

    pub(super) fn push_frame(&mut self, frame: &[f32], decision: VadDecision) {
        self.samples.extend_from_slice(frame);
        if matches!(decision, VadDecision::Silence) {
            self.trailing_silence = self.trailing_silence.saturating_add(frame.len());
        } else {
            self.trailing_silence = 0;
        }
        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
            self.trailing_silence = self.trailing_silence.min(self.samples.len());
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Finish the capture. A silence stop keeps only `lookback` worth of the
    /// trailing quiet so the transcriber is not fed two seconds of nothing.
    pub(super) fn into_audio(mut self, stop: &StopReason) -> Vec<f32> {
        if matches!(stop, StopReason::Silence { .. }) {
            let excess = self.trailing_silence.saturating_sub(self.lookback_samples);
            self.samples.truncate(self.samples.len() - excess);
        }
        self.samples
    }
}

/// Run the capture state machine over already-decoded PCM. This is the same
/// loop the live recorder drives, minus the hardware; tests and offline
/// tools use it to exercise silence-timer behavior deterministically.
pub fn capture_from_pcm(
    samples: &[f32],
    settings: &VoiceSettings,
    vad: &mut dyn VadEngine,
) -> CaptureOutcome {
    let frame_ms = settings.vad_frame_ms.clamp(5, 120);
    let frame_samples = ((u64::from(settings.sample_rate) * frame_ms) / 1000).max(1) as usize;

    let mut timer = SilenceTimer::new(settings);
    let mut sink = SampleSink::new(settings);
    let mut smoother = VadSmoother::new(settings.vad_smoothing_frames);
    let mut stats = CaptureStats::default();

    for chunk in samples.chunks(frame_samples) {
        let mut frame = chunk.to_vec();
        frame.resize(frame_samples, 0.0);
        let decision = smoother.smooth(vad.classify(&frame));
        stats.frames_processed += 1;
        sink.push_frame(&frame, decision);
        if let Some(reason) = timer.on_frame(decision) {
            stats.stop = reason;
            break;
        }
    }

    stats.capture_ms = timer.total_ms();
    stats.speech_ms = timer.speech_ms();
    let audio = sink.into_audio(&stats.stop);
    CaptureOutcome { audio, stats }
}
