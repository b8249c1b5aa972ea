use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn aidterm_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_aidterm").expect("aidterm test binary not built")
}

#[test]
fn help_mentions_name() {
    let output = Command::new(aidterm_bin())
        .arg("--help")
        .output()
        .expect("run aidterm --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("aidterm"));
    assert!(combined.contains("--base-url"));
}

#[test]
fn list_input_devices_prints_message() {
    let output = Command::new(aidterm_bin())
        .arg("--list-input-devices")
        .env("AIDTERM_TEST_DEVICES", "Test Mic")
        .output()
        .expect("run aidterm --list-input-devices");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("Available audio input devices:"));
    assert!(combined.contains("Test Mic"));
}

#[test]
fn invalid_base_url_fails_fast() {
    let output = Command::new(aidterm_bin())
        .args(["--base-url", "not-a-url"])
        .output()
        .expect("run aidterm with bad base url");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("--base-url"));
}
