//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    default_session_file, default_speak_cmd, DEFAULT_METRONOME_BEEP_MS,
    DEFAULT_METRONOME_FREQUENCY_HZ, DEFAULT_METRONOME_INTERVAL_MS, DEFAULT_VOICE_BUFFER_MS,
    DEFAULT_VOICE_CHANNEL_CAPACITY, DEFAULT_VOICE_LOOKBACK_MS, DEFAULT_VOICE_MAX_CAPTURE_MS,
    DEFAULT_VOICE_MIN_SPEECH_MS, DEFAULT_VOICE_SAMPLE_RATE, DEFAULT_VOICE_SILENCE_TAIL_MS,
    DEFAULT_VOICE_VAD_FRAME_MS, DEFAULT_VOICE_VAD_SMOOTHING_FRAMES,
    DEFAULT_VOICE_VAD_THRESHOLD_DB, PREFERRED_VOICES,
};
use defaults::{
    DEFAULT_API_TIMEOUT_MS, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_GEO_TIMEOUT_MS,
    DEFAULT_GEO_URL,
};

/// CLI options for the aidterm TUI. Validated values keep downstream
/// workers and subprocesses safe.
#[derive(Debug, Parser, Clone)]
#[command(about = "aidterm - emergency medical assistance TUI", author, version)]
pub struct AppConfig {
    /// Base URL of the assistance service (chat, auth, profile routes)
    #[arg(long = "base-url", env = "AIDTERM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Connect timeout for the chat stream (milliseconds)
    #[arg(long = "connect-timeout-ms", default_value_t = DEFAULT_CONNECT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Request timeout for account/profile calls (milliseconds)
    #[arg(long = "api-timeout-ms", default_value_t = DEFAULT_API_TIMEOUT_MS)]
    pub api_timeout_ms: u64,

    /// Geolocation endpoint queried on emergency entry
    #[arg(long = "geo-url", env = "AIDTERM_GEO_URL", default_value = DEFAULT_GEO_URL)]
    pub geo_url: String,

    /// Location acquisition timeout (milliseconds)
    #[arg(long = "geo-timeout-ms", default_value_t = DEFAULT_GEO_TIMEOUT_MS)]
    pub geo_timeout_ms: u64,

    /// Session file holding the signed-in user id (YAML)
    #[arg(long = "session-file", env = "AIDTERM_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "AIDTERM_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "AIDTERM_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging message/transcript snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "AIDTERM_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,

    /// Whisper model path (ggml format) for voice input
    #[arg(long = "whisper-model-path", env = "AIDTERM_WHISPER_MODEL")]
    pub whisper_model_path: Option<String>,

    /// Language passed to Whisper
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Whisper temperature
    #[arg(long = "whisper-temperature", default_value_t = 0.0)]
    pub whisper_temperature: f32,

    /// Speaker command for voice output (platform default when omitted)
    #[arg(long = "speak-cmd", env = "AIDTERM_SPEAK_CMD")]
    pub speak_cmd: Option<String>,

    /// Preferred synthesis voice, tried in order (repeatable)
    #[arg(long = "preferred-voice", value_name = "NAME")]
    pub preferred_voices: Vec<String>,

    /// Target sample rate for the voice pipeline (Hz)
    #[arg(long = "voice-sample-rate", default_value_t = DEFAULT_VOICE_SAMPLE_RATE)]
    pub voice_sample_rate: u32,

    /// Maximum capture duration before a hard stop (milliseconds)
    #[arg(long = "voice-max-capture-ms", default_value_t = DEFAULT_VOICE_MAX_CAPTURE_MS)]
    pub voice_max_capture_ms: u64,

    /// Trailing silence required before a listening session submits (milliseconds)
    #[arg(long = "voice-silence-tail-ms", default_value_t = DEFAULT_VOICE_SILENCE_TAIL_MS)]
    pub voice_silence_tail_ms: u64,

    /// Minimum speech required before silence can stop capture (milliseconds)
    #[arg(long = "voice-min-speech-ms", default_value_t = DEFAULT_VOICE_MIN_SPEECH_MS)]
    pub voice_min_speech_ms: u64,

    /// Trailing silence retained after a silence stop (milliseconds)
    #[arg(long = "voice-lookback-ms", default_value_t = DEFAULT_VOICE_LOOKBACK_MS)]
    pub voice_lookback_ms: u64,

    /// Total buffered audio budget (milliseconds)
    #[arg(long = "voice-buffer-ms", default_value_t = DEFAULT_VOICE_BUFFER_MS)]
    pub voice_buffer_ms: u64,

    /// Frame channel capacity between capture and STT workers
    #[arg(
        long = "voice-channel-capacity",
        default_value_t = DEFAULT_VOICE_CHANNEL_CAPACITY
    )]
    pub voice_channel_capacity: usize,

    /// Voice activity detection threshold (decibels)
    #[arg(
        long = "voice-vad-threshold-db",
        default_value_t = DEFAULT_VOICE_VAD_THRESHOLD_DB
    )]
    pub voice_vad_threshold_db: f32,

    /// Voice activity detection frame size (milliseconds)
    #[arg(long = "voice-vad-frame-ms", default_value_t = DEFAULT_VOICE_VAD_FRAME_MS)]
    pub voice_vad_frame_ms: u64,

    /// VAD smoothing window (frames)
    #[arg(
        long = "voice-vad-smoothing-frames",
        default_value_t = DEFAULT_VOICE_VAD_SMOOTHING_FRAMES
    )]
    pub voice_vad_smoothing_frames: usize,

    /// Metronome click interval (milliseconds)
    #[arg(long = "metronome-interval-ms", default_value_t = DEFAULT_METRONOME_INTERVAL_MS)]
    pub metronome_interval_ms: u64,

    /// Metronome click frequency (Hz)
    #[arg(long = "metronome-frequency-hz", default_value_t = DEFAULT_METRONOME_FREQUENCY_HZ)]
    pub metronome_frequency_hz: f32,
}

/// Tunable parameters for the voice capture + STT pipeline, snapshotted for
/// worker threads.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub sample_rate: u32,
    pub max_capture_ms: u64,
    pub silence_tail_ms: u64,
    pub min_speech_ms: u64,
    pub lookback_ms: u64,
    pub buffer_ms: u64,
    pub channel_capacity: usize,
    pub vad_threshold_db: f32,
    pub vad_frame_ms: u64,
    pub vad_smoothing_frames: usize,
    pub lang: String,
    pub temperature: f32,
}

impl AppConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }

    pub fn metronome_interval(&self) -> Duration {
        Duration::from_millis(self.metronome_interval_ms)
    }

    /// Resolved speaker command (platform default when unset).
    pub fn speak_command(&self) -> String {
        self.speak_cmd.clone().unwrap_or_else(default_speak_cmd)
    }

    /// Resolved synthesis voice preference list.
    pub fn voice_preferences(&self) -> Vec<String> {
        if self.preferred_voices.is_empty() {
            PREFERRED_VOICES.iter().map(|v| v.to_string()).collect()
        } else {
            self.preferred_voices.clone()
        }
    }

    /// Resolved session file path.
    pub fn session_file_path(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(default_session_file)
    }

    /// Snapshot the CLI-controlled voice/VAD settings for workers.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            sample_rate: self.voice_sample_rate,
            max_capture_ms: self.voice_max_capture_ms,
            silence_tail_ms: self.voice_silence_tail_ms,
            min_speech_ms: self.voice_min_speech_ms,
            lookback_ms: self.voice_lookback_ms,
            buffer_ms: self.voice_buffer_ms,
            channel_capacity: self.voice_channel_capacity,
            vad_threshold_db: self.voice_vad_threshold_db,
            vad_frame_ms: self.voice_vad_frame_ms,
            vad_smoothing_frames: self.voice_vad_smoothing_frames,
            lang: self.lang.clone(),
            temperature: self.whisper_temperature,
        }
    }
}
