//! CPR pacing metronome.
//!
//! Emits a short sine click at compression pace (~110 BPM by default) on the
//! default output device and counts compressions. The waveform generator is
//! separate from the device stream so pacing math stays testable without
//! audio hardware.

use crate::config::DEFAULT_METRONOME_BEEP_MS;
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CLICK_GAIN: f32 = 0.3;

/// One generated output sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub sample: f32,
    /// True on the first sample of each click.
    pub click_start: bool,
}

/// Sine-burst generator: `beep_samples` of tone at the start of every
/// `interval_samples` period, silence for the rest.
#[derive(Debug, Clone)]
pub struct ClickWave {
    sample_rate: f32,
    interval_samples: u64,
    beep_samples: u64,
    frequency_hz: f32,
    position: u64,
}

impl ClickWave {
    pub fn new(sample_rate: u32, interval: Duration, frequency_hz: f32) -> Self {
        let sample_rate = sample_rate.max(1);
        let interval_samples =
            ((u128::from(sample_rate) * interval.as_millis()) / 1000).max(1) as u64;
        let beep_samples =
            ((u64::from(sample_rate) * DEFAULT_METRONOME_BEEP_MS) / 1000).min(interval_samples);
        Self {
            sample_rate: sample_rate as f32,
            interval_samples,
            beep_samples,
            frequency_hz,
            position: 0,
        }
    }

    pub fn tick(&mut self) -> Tick {
        let phase = self.position % self.interval_samples;
        let click_start = phase == 0;
        let sample = if phase < self.beep_samples {
            let t = phase as f32 / self.sample_rate;
            (TAU * self.frequency_hz * t).sin() * CLICK_GAIN
        } else {
            0.0
        };
        self.position = self.position.wrapping_add(1);
        Tick {
            sample,
            click_start,
        }
    }
}

/// The pacing aid itself: owns the output stream while running.
pub struct Metronome {
    interval: Duration,
    frequency_hz: f32,
    stream: Option<cpal::Stream>,
    clicks: Arc<AtomicUsize>,
}

impl Metronome {
    pub fn new(interval: Duration, frequency_hz: f32) -> Self {
        Self {
            interval,
            frequency_hz,
            stream: None,
            clicks: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start clicking. Already running is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no audio output device available")?;
        let default_config = device.default_output_config()?;
        let format = default_config.sample_format();
        let config: StreamConfig = default_config.into();
        let channels = usize::from(config.channels.max(1));
        let mut wave = ClickWave::new(config.sample_rate.0, self.interval, self.frequency_hz);
        let clicks = self.clicks.clone();

        let err_fn = |err| log_debug(&format!("metronome stream error: {err}"));
        let stream = match format {
            SampleFormat::F32 => device.build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    for frame in data.chunks_mut(channels) {
                        let tick = wave.tick();
                        if tick.click_start {
                            clicks.fetch_add(1, Ordering::Relaxed);
                        }
                        frame.fill(tick.sample);
                    }
                },
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    for frame in data.chunks_mut(channels) {
                        let tick = wave.tick();
                        if tick.click_start {
                            clicks.fetch_add(1, Ordering::Relaxed);
                        }
                        frame.fill((tick.sample * 32_767.0) as i16);
                    }
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported output sample format: {other:?}")),
        };

        stream.play()?;
        self.clicks.store(0, Ordering::Relaxed);
        self.stream = Some(stream);
        Ok(())
    }

    /// Stop clicking and reset the compression count.
    pub fn stop(&mut self) {
        self.stream = None;
        self.clicks.store(0, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Compressions clicked since the last start.
    pub fn compressions(&self) -> usize {
        self.clicks.load(Ordering::Relaxed)
    }
}
