//! Per-frame speech/silence classification.
//!
//! The silence timer that ends a listening session is driven by these
//! decisions: every speech frame resets it, a long enough run of silence
//! frames fires it.

use std::collections::VecDeque;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    Uncertain,
}

/// Frame classifier. Frames are fixed-size mono PCM at the target rate;
/// callers own the frame-size contract.
pub trait VadEngine {
    fn classify(&mut self, frame: &[f32]) -> VadDecision;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

/// RMS-energy threshold detector. Cheap and good enough for push-to-talk
/// style capture in a quiet room; the trait exists so a heavier detector can
/// slot in.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    threshold_db: f32,
}

impl EnergyVad {
    pub fn new(threshold_db: f32) -> Self {
        Self { threshold_db }
    }
}

impl VadEngine for EnergyVad {
    fn classify(&mut self, frame: &[f32]) -> VadDecision {
        if frame.is_empty() {
            return VadDecision::Uncertain;
        }
        let energy: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;
        let rms = energy.sqrt().max(1e-6);
        let db = 20.0 * rms.log10();
        if db >= self.threshold_db {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "energy_vad"
    }
}

/// Majority vote over the last N decisions. Keeps one noisy frame from
/// resetting the silence timer.
pub struct VadSmoother {
    window: VecDeque<VadDecision>,
    size: usize,
}

impl VadSmoother {
    pub fn new(size: usize) -> Self {
        Self {
            window: VecDeque::new(),
            size: size.max(1),
        }
    }

    pub fn smooth(&mut self, decision: VadDecision) -> VadDecision {
        if self.size <= 1 {
            return decision;
        }
        self.window.push_back(decision);
        if self.window.len() > self.size {
            self.window.pop_front();
        }

        let speech = self
            .window
            .iter()
            .filter(|d| matches!(d, VadDecision::Speech))
            .count();
        let silence = self
            .window
            .iter()
            .filter(|d| matches!(d, VadDecision::Silence))
            .count();
        match speech.cmp(&silence) {
            std::cmp::Ordering::Greater => VadDecision::Speech,
            std::cmp::Ordering::Less => VadDecision::Silence,
            std::cmp::Ordering::Equal => decision,
        }
    }
}
