//! Default values shared by the CLI definition and validation.

use std::path::PathBuf;

/// Base URL of the assistance service (chat, auth, profile routes).
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";
/// IP-geolocation-shaped endpoint used for emergency location fixes.
pub const DEFAULT_GEO_URL: &str = "http://ip-api.com/json";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GEO_TIMEOUT_MS: u64 = 10_000;

pub const DEFAULT_VOICE_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_VOICE_MAX_CAPTURE_MS: u64 = 15_000;
/// Trailing silence that ends a listening session; mirrors the two-second
/// submit timer of the original client.
pub const DEFAULT_VOICE_SILENCE_TAIL_MS: u64 = 2_000;
pub const DEFAULT_VOICE_MIN_SPEECH_MS: u64 = 200;
pub const DEFAULT_VOICE_LOOKBACK_MS: u64 = 500;
pub const DEFAULT_VOICE_BUFFER_MS: u64 = 30_000;
pub const DEFAULT_VOICE_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_VOICE_VAD_THRESHOLD_DB: f32 = -55.0;
pub const DEFAULT_VOICE_VAD_FRAME_MS: u64 = 20;
pub const DEFAULT_VOICE_VAD_SMOOTHING_FRAMES: usize = 3;

pub const MAX_CAPTURE_HARD_LIMIT_MS: u64 = 60_000;

/// ~110 BPM compression pace.
pub const DEFAULT_METRONOME_INTERVAL_MS: u64 = 550;
pub const DEFAULT_METRONOME_FREQUENCY_HZ: f32 = 800.0;
pub const DEFAULT_METRONOME_BEEP_MS: u64 = 100;

/// Voice names tried in order before falling back to any voice with a
/// feminine designation, then the platform default.
pub const PREFERRED_VOICES: [&str; 4] = [
    "Google US English",
    "Microsoft Zira",
    "Samantha",
    "Google UK English Female",
];

/// Platform speaker command used when `--speak-cmd` is not given.
pub fn default_speak_cmd() -> String {
    #[cfg(target_os = "macos")]
    {
        "say".to_string()
    }
    #[cfg(not(target_os = "macos"))]
    {
        "espeak".to_string()
    }
}

/// Session file location: `~/.aidterm/session.yaml`, or the temp dir when no
/// home directory is visible.
pub fn default_session_file() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".aidterm").join("session.yaml"),
        None => std::env::temp_dir().join("aidterm_session.yaml"),
    }
}
