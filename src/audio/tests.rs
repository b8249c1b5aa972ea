use super::capture::{capture_from_pcm, StopReason};
use super::metronome::ClickWave;
use super::resample::{fit_length, to_target_rate};
use super::vad::{EnergyVad, VadDecision, VadEngine, VadSmoother};
use super::TARGET_RATE;
use crate::config::VoiceSettings;
use std::time::Duration;

fn test_settings() -> VoiceSettings {
    VoiceSettings {
        sample_rate: TARGET_RATE,
        max_capture_ms: 10_000,
        silence_tail_ms: 2_000,
        min_speech_ms: 200,
        lookback_ms: 500,
        buffer_ms: 20_000,
        channel_capacity: 64,
        vad_threshold_db: -55.0,
        vad_frame_ms: 20,
        vad_smoothing_frames: 1,
        lang: "en".to_string(),
        temperature: 0.0,
    }
}

fn tone(ms: u64, amplitude: f32) -> Vec<f32> {
    let samples = (u64::from(TARGET_RATE) * ms / 1000) as usize;
    (0..samples)
        .map(|i| (i as f32 * 0.3).sin() * amplitude)
        .collect()
}

fn silence(ms: u64) -> Vec<f32> {
    vec![0.0; (u64::from(TARGET_RATE) * ms / 1000) as usize]
}

#[test]
fn energy_vad_separates_tone_from_silence() {
    let mut vad = EnergyVad::new(-55.0);
    assert_eq!(vad.classify(&tone(20, 0.5)), VadDecision::Speech);
    assert_eq!(vad.classify(&silence(20)), VadDecision::Silence);
    assert_eq!(vad.classify(&[]), VadDecision::Uncertain);
}

#[test]
fn smoother_suppresses_single_frame_blips() {
    let mut smoother = VadSmoother::new(3);
    smoother.smooth(VadDecision::Silence);
    smoother.smooth(VadDecision::Silence);
    // One speech frame among silence should not flip the majority.
    assert_eq!(smoother.smooth(VadDecision::Speech), VadDecision::Silence);
}

#[test]
fn silence_tail_stops_capture_after_speech() {
    let settings = test_settings();
    let mut vad = EnergyVad::new(settings.vad_threshold_db);
    let mut pcm = tone(600, 0.5);
    pcm.extend(silence(3_000));

    let outcome = capture_from_pcm(&pcm, &settings, &mut vad);
    assert!(
        matches!(outcome.stats.stop, StopReason::Silence { tail_ms } if tail_ms >= 2_000),
        "expected silence stop, got {:?}",
        outcome.stats.stop
    );
    assert!(outcome.stats.speech_ms >= 500);
    // Trailing quiet is trimmed down to the lookback window.
    let max_expected =
        (u64::from(TARGET_RATE) * (600 + settings.lookback_ms + 100) / 1000) as usize;
    assert!(outcome.audio.len() <= max_expected);
}

#[test]
fn quiet_room_runs_to_max_duration() {
    let mut settings = test_settings();
    settings.max_capture_ms = 1_000;
    settings.buffer_ms = 2_000;
    let mut vad = EnergyVad::new(settings.vad_threshold_db);

    let outcome = capture_from_pcm(&silence(3_000), &settings, &mut vad);
    assert_eq!(outcome.stats.stop, StopReason::MaxDuration);
    assert_eq!(outcome.stats.speech_ms, 0);
}

#[test]
fn short_blip_below_min_speech_does_not_arm_silence_stop() {
    let mut settings = test_settings();
    settings.min_speech_ms = 500;
    settings.max_capture_ms = 4_000;
    settings.buffer_ms = 8_000;
    let mut vad = EnergyVad::new(settings.vad_threshold_db);

    let mut pcm = tone(60, 0.5);
    pcm.extend(silence(5_000));
    let outcome = capture_from_pcm(&pcm, &settings, &mut vad);
    assert_eq!(outcome.stats.stop, StopReason::MaxDuration);
}

#[test]
fn resample_identity_at_target_rate() {
    let input = tone(100, 0.2);
    let output = to_target_rate(&input, TARGET_RATE);
    assert_eq!(input, output);
}

#[test]
fn resample_halves_sample_count_from_double_rate() {
    let input = vec![0.5f32; 3_200];
    let output = to_target_rate(&input, TARGET_RATE * 2);
    let expected = input.len() / 2;
    let tolerance = expected / 10 + 8;
    assert!(
        (output.len() as i64 - expected as i64).unsigned_abs() as usize <= tolerance,
        "expected ~{expected} samples, got {}",
        output.len()
    );
}

#[test]
fn fit_length_pads_and_truncates() {
    assert_eq!(fit_length(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
    assert_eq!(fit_length(vec![1.0], 3), vec![1.0, 1.0, 1.0]);
    assert_eq!(fit_length(Vec::new(), 2), vec![0.0, 0.0]);
}

#[test]
fn click_wave_spaces_clicks_at_the_interval() {
    let rate = 8_000u32;
    let mut wave = ClickWave::new(rate, Duration::from_millis(550), 800.0);
    let samples_per_interval = (u64::from(rate) * 550 / 1000) as usize;

    let mut starts = Vec::new();
    for i in 0..samples_per_interval * 3 {
        if wave.tick().click_start {
            starts.push(i);
        }
    }
    assert_eq!(
        starts,
        vec![0, samples_per_interval, samples_per_interval * 2]
    );
}

#[test]
fn click_wave_is_silent_between_beeps() {
    let rate = 8_000u32;
    let mut wave = ClickWave::new(rate, Duration::from_millis(550), 800.0);
    let beep_samples = (u64::from(rate) * 100 / 1000) as usize;
    let interval_samples = (u64::from(rate) * 550 / 1000) as usize;

    let mut heard_tone = false;
    for i in 0..interval_samples {
        let tick = wave.tick();
        if i < beep_samples {
            heard_tone |= tick.sample.abs() > 0.0;
        } else {
            assert_eq!(tick.sample, 0.0, "sample {i} should be silent");
        }
    }
    assert!(heard_tone);
}
