//! Sample-rate conversion to the transcriber's 16 kHz mono format.
//!
//! The optional `high-quality-audio` feature routes through rubato's sinc
//! resampler; otherwise (or when rubato errors) a linear resampler with a
//! small averaging pre-filter handles the common 44.1/48 kHz microphones.

use super::TARGET_RATE;
use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
#[cfg(feature = "high-quality-audio")]
use std::sync::atomic::{AtomicBool, Ordering};

const MIN_DEVICE_RATE: u32 = 2_000;
const MAX_DEVICE_RATE: u32 = 1_600_000;

#[cfg(feature = "high-quality-audio")]
static SINC_WARNING_SHOWN: AtomicBool = AtomicBool::new(false);

/// Convert `input` from the device rate to [`TARGET_RATE`].
pub(super) fn to_target_rate(input: &[f32], device_rate: u32) -> Vec<f32> {
    if input.is_empty() || device_rate == 0 || device_rate == TARGET_RATE {
        return input.to_vec();
    }
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
        log_debug(&format!(
            "refusing to resample from implausible device rate {device_rate}Hz"
        ));
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match sinc_resample(input, device_rate) {
            Ok(output) => return output,
            Err(err) => {
                if !SINC_WARNING_SHOWN.swap(true, Ordering::AcqRel) {
                    log_debug(&format!(
                        "sinc resampler failed ({err}); falling back to linear path"
                    ));
                }
            }
        }
    }

    linear_resample(input, device_rate)
}

/// Resample one capture frame and pin it to the frame length the VAD
/// expects.
pub(super) fn frame_to_target(frame: Vec<f32>, device_rate: u32, desired_len: usize) -> Vec<f32> {
    let converted = if device_rate == TARGET_RATE {
        frame
    } else {
        to_target_rate(&frame, device_rate)
    };
    fit_length(converted, desired_len)
}

pub(super) fn fit_length(mut data: Vec<f32>, desired: usize) -> Vec<f32> {
    if data.len() > desired {
        data.truncate(desired);
    } else if data.len() < desired {
        let pad = data.last().copied().unwrap_or(0.0);
        data.resize(desired, pad);
    }
    data
}

#[cfg(feature = "high-quality-audio")]
fn sinc_resample(input: &[f32], device_rate: u32) -> Result<Vec<f32>> {
    let ratio = f64::from(TARGET_RATE) / f64::from(device_rate);
    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expect = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(expect + 8);
    let mut seg = vec![0.0f32; chunk];
    for block in input.chunks(chunk) {
        let pad = block.last().copied().unwrap_or(0.0);
        seg.fill(pad);
        seg[..block.len()].copy_from_slice(block);
        let produced = resampler
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        out.extend_from_slice(&produced[0]);
    }

    // Fixed-chunk processing over/under-shoots by a partial chunk at most.
    Ok(fit_length(out, expect))
}

/// Linear interpolation, with a short moving-average pre-filter when
/// decimating so high frequencies do not alias into the speech band.
fn linear_resample(input: &[f32], device_rate: u32) -> Vec<f32> {
    let ratio = f64::from(TARGET_RATE) / f64::from(device_rate);
    let filtered;
    let source: &[f32] = if device_rate > TARGET_RATE {
        let window = (device_rate / TARGET_RATE).max(1) as usize;
        filtered = moving_average(input, window);
        &filtered
    } else {
        input
    };

    let output_len = ((source.len() as f64) * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);
    for i in 0..output_len {
        let src = i as f64 / ratio;
        let idx = src.floor() as usize;
        let frac = (src - idx as f64) as f32;
        let sample = match (source.get(idx), source.get(idx + 1)) {
            (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
            (Some(a), None) => *a,
            _ => 0.0,
        };
        output.push(sample);
    }
    output
}

fn moving_average(input: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || input.is_empty() {
        return input.to_vec();
    }
    let mut out = Vec::with_capacity(input.len());
    let mut sum = 0.0f32;
    for (i, sample) in input.iter().enumerate() {
        sum += sample;
        if i >= window {
            sum -= input[i - window];
        }
        let denom = (i + 1).min(window) as f32;
        out.push(sum / denom);
    }
    out
}
