//! Voice output: speech synthesis through an external speaker command.
//!
//! Synthesis is the second voice state machine (`Idle`/`Speaking`). Each
//! utterance is one child process; speaking again cancels the previous
//! child first so responses never overlap. Failures are logged and
//! otherwise silent.

use crate::log_debug;
use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisState {
    Idle,
    Speaking,
}

/// Strip markdown decoration before handing text to the speaker.
pub fn clean_speech_text(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '#' | '`'))
        .collect()
}

/// Pick a synthesis voice: first available voice containing a preferred
/// name, then any voice advertising a feminine designation, then none
/// (platform default).
pub fn select_voice(available: &[String], preferences: &[String]) -> Option<String> {
    available
        .iter()
        .find(|voice| preferences.iter().any(|pref| voice.contains(pref.as_str())))
        .or_else(|| {
            available
                .iter()
                .find(|voice| voice.to_lowercase().contains("female"))
        })
        .cloned()
}

/// Speaker subprocess wrapper.
pub struct Speaker {
    command: Vec<String>,
    preferences: Vec<String>,
    voice: Option<String>,
    voice_probed: bool,
    child: Option<Child>,
}

impl Speaker {
    /// `command_line` is split with shell rules; the first word is the
    /// program, the rest are leading arguments.
    pub fn new(command_line: &str, preferences: Vec<String>) -> Result<Self> {
        let command = shell_words::split(command_line)
            .with_context(|| format!("invalid speaker command '{command_line}'"))?;
        if command.is_empty() {
            anyhow::bail!("speaker command is empty");
        }
        Ok(Self {
            command,
            preferences,
            voice: None,
            voice_probed: false,
            child: None,
        })
    }

    /// Current state; reaps the child when the utterance has finished.
    pub fn state(&mut self) -> SynthesisState {
        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(_)) | Err(_) => {
                    self.child = None;
                }
                Ok(None) => return SynthesisState::Speaking,
            }
        }
        SynthesisState::Idle
    }

    /// Speak `text`, cancelling any in-progress utterance first. Empty text
    /// (after cleanup) only cancels.
    pub fn speak(&mut self, text: &str) {
        self.stop();

        let cleaned = clean_speech_text(text);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return;
        }

        if !self.voice_probed {
            self.voice = select_voice(&self.available_voices(), &self.preferences);
            self.voice_probed = true;
            if let Some(voice) = &self.voice {
                log_debug(&format!("synthesis voice selected: {voice}"));
            }
        }

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]);
        if let Some(voice) = &self.voice {
            cmd.args(["-v", voice]);
        }
        cmd.arg(cleaned)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        match cmd.spawn() {
            Ok(child) => self.child = Some(child),
            Err(err) => log_debug(&format!(
                "speech synthesis failed to start ({}): {err}",
                self.command[0]
            )),
        }
    }

    /// Kill the in-progress utterance, if any.
    pub fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    /// Best-effort voice enumeration via the speaker command's `-v ?`
    /// convention; commands without one just yield the platform default.
    fn available_voices(&self) -> Vec<String> {
        let output = Command::new(&self.command[0])
            .args(&self.command[1..])
            .args(["-v", "?"])
            .stdin(Stdio::null())
            .output();
        let Ok(output) = output else {
            return Vec::new();
        };
        if !output.status.success() {
            return Vec::new();
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(String::from)
            .collect()
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voices(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn clean_speech_text_strips_markdown_decoration() {
        assert_eq!(
            clean_speech_text("**Press hard**, `twice` _per_ #second"),
            "Press hard, twice per second"
        );
    }

    #[test]
    fn preference_match_wins_over_feminine_designation() {
        let available = voices(&["Alex", "Samantha", "Karen Female"]);
        let preferences = voices(&["Samantha"]);
        assert_eq!(
            select_voice(&available, &preferences),
            Some("Samantha".to_string())
        );
    }

    #[test]
    fn feminine_designation_is_the_second_choice() {
        let available = voices(&["Alex", "Google UK Female", "Daniel"]);
        let preferences = voices(&["Samantha"]);
        assert_eq!(
            select_voice(&available, &preferences),
            Some("Google UK Female".to_string())
        );
    }

    #[test]
    fn no_match_falls_back_to_platform_default() {
        let available = voices(&["Alex", "Daniel"]);
        let preferences = voices(&["Samantha"]);
        assert_eq!(select_voice(&available, &preferences), None);
    }

    #[test]
    fn preference_matches_substring_of_full_voice_name() {
        let available = voices(&["Microsoft Zira Desktop"]);
        let preferences = voices(&["Microsoft Zira"]);
        assert_eq!(
            select_voice(&available, &preferences),
            Some("Microsoft Zira Desktop".to_string())
        );
    }

    #[test]
    fn speaker_rejects_empty_command() {
        assert!(Speaker::new("", Vec::new()).is_err());
        assert!(Speaker::new("   ", Vec::new()).is_err());
    }

    #[test]
    fn speaker_with_true_command_finishes_quickly() {
        // `true` exits immediately: state must settle back to Idle.
        let mut speaker = Speaker::new("true", Vec::new()).expect("speaker builds");
        speaker.voice_probed = true;
        speaker.speak("hello");
        for _ in 0..100 {
            if speaker.state() == SynthesisState::Idle {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        panic!("speaker never returned to idle");
    }
}
