use super::defaults::MAX_CAPTURE_HARD_LIMIT_MS;
use super::AppConfig;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        check_service_url(&self.base_url, "--base-url")?;
        check_service_url(&self.geo_url, "--geo-url")?;

        if self.connect_timeout_ms == 0 || self.connect_timeout_ms > 120_000 {
            bail!(
                "--connect-timeout-ms must be between 1 and 120000, got {}",
                self.connect_timeout_ms
            );
        }
        if self.api_timeout_ms == 0 || self.api_timeout_ms > 120_000 {
            bail!(
                "--api-timeout-ms must be between 1 and 120000, got {}",
                self.api_timeout_ms
            );
        }
        if self.geo_timeout_ms == 0 || self.geo_timeout_ms > 120_000 {
            bail!(
                "--geo-timeout-ms must be between 1 and 120000, got {}",
                self.geo_timeout_ms
            );
        }

        if !(8_000..=96_000).contains(&self.voice_sample_rate) {
            bail!(
                "--voice-sample-rate must be between 8000 and 96000 Hz, got {}",
                self.voice_sample_rate
            );
        }
        if self.voice_max_capture_ms == 0 || self.voice_max_capture_ms > MAX_CAPTURE_HARD_LIMIT_MS {
            bail!(
                "--voice-max-capture-ms must be between 1 and {MAX_CAPTURE_HARD_LIMIT_MS} ms, got {}",
                self.voice_max_capture_ms
            );
        }
        if self.voice_silence_tail_ms < 200
            || self.voice_silence_tail_ms > self.voice_max_capture_ms
        {
            bail!(
                "--voice-silence-tail-ms must be >=200 and <= --voice-max-capture-ms ({})",
                self.voice_max_capture_ms
            );
        }
        if self.voice_min_speech_ms < 50 || self.voice_min_speech_ms > self.voice_max_capture_ms {
            bail!(
                "--voice-min-speech-ms must be between 50 and {}",
                self.voice_max_capture_ms
            );
        }
        if self.voice_lookback_ms > self.voice_max_capture_ms {
            bail!(
                "--voice-lookback-ms ({}) cannot exceed --voice-max-capture-ms ({})",
                self.voice_lookback_ms,
                self.voice_max_capture_ms
            );
        }
        if self.voice_buffer_ms < self.voice_max_capture_ms || self.voice_buffer_ms > 120_000 {
            bail!(
                "--voice-buffer-ms must be between {} and 120000 (ms)",
                self.voice_max_capture_ms
            );
        }
        if !(8..=1024).contains(&self.voice_channel_capacity) {
            bail!(
                "--voice-channel-capacity must be between 8 and 1024, got {}",
                self.voice_channel_capacity
            );
        }
        if !(-120.0..=0.0).contains(&self.voice_vad_threshold_db) {
            bail!(
                "--voice-vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.voice_vad_threshold_db
            );
        }
        if !(5..=120).contains(&self.voice_vad_frame_ms) {
            bail!(
                "--voice-vad-frame-ms must be between 5 and 120, got {}",
                self.voice_vad_frame_ms
            );
        }
        if !(1..=10).contains(&self.voice_vad_smoothing_frames) {
            bail!(
                "--voice-vad-smoothing-frames must be between 1 and 10, got {}",
                self.voice_vad_smoothing_frames
            );
        }
        if !(0.0..=5.0).contains(&self.whisper_temperature) {
            bail!(
                "--whisper-temperature must be between 0.0 and 5.0, got {}",
                self.whisper_temperature
            );
        }

        if !(100..=2_000).contains(&self.metronome_interval_ms) {
            bail!(
                "--metronome-interval-ms must be between 100 and 2000, got {}",
                self.metronome_interval_ms
            );
        }
        if !(100.0..=4_000.0).contains(&self.metronome_frequency_hz) {
            bail!(
                "--metronome-frequency-hz must be between 100 and 4000, got {}",
                self.metronome_frequency_hz
            );
        }

        // If a whisper model was supplied, it must exist; canonicalize so the
        // worker threads get a stable absolute path.
        if let Some(model) = &mut self.whisper_model_path {
            let model_path = Path::new(model);
            if !model_path.exists() {
                bail!(
                    "whisper model path '{}' does not exist",
                    model_path.display()
                );
            }
            let canonical = model_path
                .canonicalize()
                .with_context(|| format!("failed to canonicalize whisper model path '{model}'"))?;
            *model = canonical
                .to_str()
                .map(|s| s.to_string())
                .context("whisper model path must be valid UTF-8")?;
        }

        if self.lang.trim().is_empty() {
            bail!("--lang must not be empty");
        }
        if !self.lang.eq_ignore_ascii_case("auto")
            && !self
                .lang
                .chars()
                .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
        {
            bail!("--lang must be 'auto' or a language code such as 'en' or 'en_US'");
        }

        if let Some(cmd) = &self.speak_cmd {
            if cmd.trim().is_empty() {
                bail!("--speak-cmd cannot be empty");
            }
            // The command line is split with shell rules later; reject control
            // characters that would survive the split.
            if cmd.chars().any(|ch| matches!(ch, '\n' | '\r')) {
                bail!("--speak-cmd must not contain newline characters");
            }
            shell_words::split(cmd)
                .with_context(|| format!("--speak-cmd '{cmd}' is not a valid command line"))?;
        }

        for voice in &self.preferred_voices {
            if voice.trim().is_empty() {
                bail!("--preferred-voice cannot be empty");
            }
        }

        Ok(())
    }
}

fn check_service_url(value: &str, flag: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        bail!("{flag} must start with http:// or https://, got '{trimmed}'");
    }
    Ok(())
}
