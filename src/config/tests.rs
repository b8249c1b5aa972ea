use super::*;
use clap::Parser;

fn parse(args: &[&str]) -> AppConfig {
    let mut full = vec!["aidterm"];
    full.extend_from_slice(args);
    AppConfig::parse_from(full)
}

fn parse_valid(args: &[&str]) -> AppConfig {
    let mut config = parse(args);
    config.validate().expect("config should validate");
    config
}

#[test]
fn defaults_validate() {
    parse_valid(&[]);
}

#[test]
fn base_url_requires_http_scheme() {
    let mut config = parse(&["--base-url", "ftp://host"]);
    let err = config.validate().expect_err("scheme should be rejected");
    assert!(err.to_string().contains("--base-url"));
}

#[test]
fn silence_tail_must_fit_inside_max_capture() {
    let mut config = parse(&[
        "--voice-max-capture-ms",
        "1000",
        "--voice-silence-tail-ms",
        "2000",
        "--voice-buffer-ms",
        "30000",
    ]);
    assert!(config.validate().is_err());
}

#[test]
fn silence_tail_defaults_to_two_seconds() {
    let config = parse_valid(&[]);
    assert_eq!(config.voice_settings().silence_tail_ms, 2_000);
}

#[test]
fn vad_threshold_range_is_enforced() {
    let mut config = parse(&["--voice-vad-threshold-db", "5.0"]);
    assert!(config.validate().is_err());
}

#[test]
fn metronome_interval_range_is_enforced() {
    let mut config = parse(&["--metronome-interval-ms", "50"]);
    assert!(config.validate().is_err());
}

#[test]
fn missing_whisper_model_path_is_rejected() {
    let mut config = parse(&["--whisper-model-path", "/no/such/model.bin"]);
    let err = config.validate().expect_err("missing model should fail");
    assert!(err.to_string().contains("does not exist"));
}

#[test]
fn speak_cmd_with_arguments_is_accepted() {
    let config = parse_valid(&["--speak-cmd", "espeak -s 160"]);
    assert_eq!(config.speak_command(), "espeak -s 160");
}

#[test]
fn unbalanced_speak_cmd_quoting_is_rejected() {
    let mut config = parse(&["--speak-cmd", "say \"unterminated"]);
    assert!(config.validate().is_err());
}

#[test]
fn voice_preferences_fall_back_to_builtin_list() {
    let config = parse_valid(&[]);
    assert_eq!(config.voice_preferences().len(), PREFERRED_VOICES.len());

    let custom = parse_valid(&["--preferred-voice", "Karen"]);
    assert_eq!(custom.voice_preferences(), vec!["Karen".to_string()]);
}

#[test]
fn lang_accepts_locale_style_values() {
    parse_valid(&["--lang", "en_US"]);
    let mut bad = parse(&["--lang", "en us"]);
    assert!(bad.validate().is_err());
}

#[test]
fn session_file_override_is_used() {
    let config = parse_valid(&["--session-file", "/tmp/custom_session.yaml"]);
    assert_eq!(
        config.session_file_path(),
        std::path::PathBuf::from("/tmp/custom_session.yaml")
    );
}
