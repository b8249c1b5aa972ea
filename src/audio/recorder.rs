//! System microphone recording via CPAL.
//!
//! The device callback downmixes to mono and slices the signal into
//! fixed-size frames; the capture loop pulls frames off a bounded channel,
//! resamples them to the target rate, and feeds the VAD state machine.

use super::capture::{CaptureOutcome, CaptureStats, SampleSink, SilenceTimer, StopReason};
use super::resample::frame_to_target;
use super::vad::{VadEngine, VadSmoother};
use crate::config::VoiceSettings;
use crate::log_debug;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// List microphone names so the CLI can expose a selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }

    /// Create a recorder, optionally forcing a specific device.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Record until the silence timer fires, the duration cap is hit, or
    /// `stop_flag` is raised. Returns 16 kHz mono PCM.
    pub fn record_with_vad(
        &self,
        settings: &VoiceSettings,
        vad: &mut dyn VadEngine,
        stop_flag: Option<Arc<AtomicBool>>,
    ) -> Result<CaptureOutcome> {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));

        let frame_ms = settings.vad_frame_ms.clamp(5, 120);
        let device_frame_samples = ((u64::from(device_rate) * frame_ms) / 1000).max(1) as usize;
        let target_frame_samples =
            ((u64::from(settings.sample_rate) * frame_ms) / 1000).max(1) as usize;

        log_debug(&format!(
            "recorder: format={format:?} rate={device_rate}Hz channels={channels} frame_ms={frame_ms}"
        ));

        let (sender, receiver) = bounded::<Vec<f32>>(settings.channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let pump = Arc::new(Mutex::new(FramePump::new(
            device_frame_samples,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| log_debug(&format!("audio stream error: {err}"));
        let stream = match format {
            SampleFormat::F32 => {
                let pump = pump.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| feed(&pump, &dropped, data, channels, |s| s),
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let pump = pump.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        feed(&pump, &dropped, data, channels, |s| s as f32 / 32_768.0)
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let pump = pump.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        feed(&pump, &dropped, data, channels, |s| {
                            (s as f32 - 32_768.0) / 32_768.0
                        })
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;

        let mut timer = SilenceTimer::new(settings);
        let mut sink = SampleSink::new(settings);
        let mut smoother = VadSmoother::new(settings.vad_smoothing_frames);
        let mut stats = CaptureStats::default();
        let mut stop = StopReason::MaxDuration;
        let wait = Duration::from_millis(frame_ms);

        loop {
            if let Some(ref flag) = stop_flag {
                if flag.load(Ordering::Relaxed) {
                    stop = StopReason::ManualStop;
                    break;
                }
            }
            match receiver.recv_timeout(wait) {
                Ok(frame) => {
                    let frame = frame_to_target(frame, device_rate, target_frame_samples);
                    let decision = smoother.smooth(vad.classify(&frame));
                    stats.frames_processed += 1;
                    sink.push_frame(&frame, decision);
                    if let Some(reason) = timer.on_frame(decision) {
                        stop = reason;
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(reason) = timer.on_idle() {
                        stop = reason;
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    stop = StopReason::Error("audio stream disconnected".to_string());
                    break;
                }
            }
        }

        if let Err(err) = stream.pause() {
            log_debug(&format!("failed to pause audio stream: {err}"));
        }
        drop(stream);

        stats.capture_ms = timer.total_ms();
        stats.speech_ms = timer.speech_ms();
        stats.frames_dropped = dropped.load(Ordering::Relaxed);
        stats.stop = stop;

        if sink.is_empty() {
            if matches!(stats.stop, StopReason::ManualStop) {
                return Ok(CaptureOutcome {
                    audio: Vec::new(),
                    stats,
                });
            }
            return Err(anyhow!(
                "no samples captured from '{}'; check microphone permissions and availability",
                self.device_name()
            ));
        }

        let audio = sink.into_audio(&stats.stop);
        Ok(CaptureOutcome { audio, stats })
    }
}

fn feed<T, F>(
    pump: &Arc<Mutex<FramePump>>,
    dropped: &Arc<AtomicUsize>,
    data: &[T],
    channels: usize,
    convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    // try_lock: the device callback must never block behind the capture loop.
    if let Ok(mut pump) = pump.try_lock() {
        pump.push(data, channels, convert);
    } else {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Downmixes interleaved device samples to mono and emits fixed-size frames
/// into the capture channel, counting frames the channel could not take.
struct FramePump {
    frame_samples: usize,
    pending: Vec<f32>,
    sender: Sender<Vec<f32>>,
    dropped: Arc<AtomicUsize>,
}

impl FramePump {
    fn new(frame_samples: usize, sender: Sender<Vec<f32>>, dropped: Arc<AtomicUsize>) -> Self {
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::with_capacity(frame_samples),
            sender,
            dropped,
        }
    }

    fn push<T, F>(&mut self, data: &[T], channels: usize, mut convert: F)
    where
        T: Copy,
        F: FnMut(T) -> f32,
    {
        if channels <= 1 {
            self.pending.extend(data.iter().copied().map(&mut convert));
        } else {
            let mut acc = 0.0f32;
            let mut count = 0usize;
            for sample in data.iter().copied() {
                acc += convert(sample);
                count += 1;
                if count == channels {
                    self.pending.push(acc / channels as f32);
                    acc = 0.0;
                    count = 0;
                }
            }
            if count > 0 {
                self.pending.push(acc / count as f32);
            }
        }

        while self.pending.len() >= self.frame_samples {
            let frame: Vec<f32> = self.pending.drain(..self.frame_samples).collect();
            match self.sender.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}
