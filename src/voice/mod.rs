//! Voice input: the listening-session worker and its state machine.
//!
//! Recognition is one of two independent voice state machines (the other is
//! synthesis, in [`speak`]); both feed the ordinary send pathway by message
//! passing rather than callbacks. A listening session records until the
//! silence timer fires or the user toggles it off, transcribes what was
//! heard off the UI thread, and reports exactly one outcome message.

mod speak;

pub use speak::{clean_speech_text, select_voice, Speaker, SynthesisState};

use crate::audio::{EnergyVad, Recorder};
use crate::config::VoiceSettings;
use crate::log_debug;
use crate::stt::Transcriber;
use anyhow::Result;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, OnceLock};
use std::thread;

/// Recognition session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecognitionState {
    #[default]
    Idle,
    Listening,
    /// Manual stop requested; waiting for the worker to flush its result.
    Stopping,
}

/// One listening session's result.
#[derive(Debug, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Non-empty transcript, ready for the send pathway.
    Transcript(String),
    /// Capture ended with nothing usable (silence, or stop before speech).
    Empty,
    /// Recognition runtime error; the session is simply over.
    Error(String),
}

/// Handle the UI polls for the worker's single outcome message.
pub struct ListenJob {
    receiver: mpsc::Receiver<ListenOutcome>,
    handle: Option<thread::JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
}

impl ListenJob {
    /// Stop capturing early and transcribe whatever was recorded.
    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Spawn the worker for one listening session.
pub fn start_listen_job(
    recorder: Arc<Mutex<Recorder>>,
    transcriber: Arc<Mutex<Transcriber>>,
    settings: VoiceSettings,
) -> ListenJob {
    let (tx, rx) = mpsc::sync_channel(1);
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop = stop_flag.clone();

    let handle = thread::spawn(move || {
        let outcome = perform_listen(&recorder, &transcriber, &settings, stop);
        let _ = tx.send(outcome);
    });

    ListenJob {
        receiver: rx,
        handle: Some(handle),
        stop_flag,
    }
}

fn perform_listen(
    recorder: &Arc<Mutex<Recorder>>,
    transcriber: &Arc<Mutex<Transcriber>>,
    settings: &VoiceSettings,
    stop_flag: Arc<AtomicBool>,
) -> ListenOutcome {
    let capture = {
        let recorder = match recorder.lock() {
            Ok(guard) => guard,
            Err(_) => return ListenOutcome::Error("audio recorder lock poisoned".to_string()),
        };
        let mut vad = EnergyVad::new(settings.vad_threshold_db);
        recorder.record_with_vad(settings, &mut vad, Some(stop_flag))
    };

    let capture = match capture {
        Ok(capture) => capture,
        Err(err) => return ListenOutcome::Error(format!("{err:#}")),
    };
    log_debug(&format!(
        "listen capture: {}ms total, {}ms speech, stop={}",
        capture.stats.capture_ms,
        capture.stats.speech_ms,
        capture.stats.stop.label()
    ));
    if capture.audio.is_empty() {
        return ListenOutcome::Empty;
    }

    let transcript = {
        let transcriber = match transcriber.lock() {
            Ok(guard) => guard,
            Err(_) => return ListenOutcome::Error("transcriber lock poisoned".to_string()),
        };
        transcriber.transcribe(&capture.audio, settings)
    };

    match transcript {
        Ok(raw) => {
            let cleaned = sanitize_transcript(&raw);
            if cleaned.is_empty() {
                ListenOutcome::Empty
            } else {
                ListenOutcome::Transcript(cleaned)
            }
        }
        Err(err) => ListenOutcome::Error(format!("{err:#}")),
    }
}

/// Strip Whisper's non-speech annotations and collapse whitespace.
pub fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?)\s*)\)",
        )
        .expect("non-speech pattern should compile")
    });
    re.replace_all(trimmed, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The recognition state machine, composing at most one live [`ListenJob`].
#[derive(Default)]
pub struct VoiceManager {
    job: Option<ListenJob>,
    state: RecognitionState,
}

impl VoiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecognitionState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, RecognitionState::Idle)
    }

    /// Adopt a freshly spawned listening session. Refused (job dropped,
    /// returns Err) while another session is live.
    pub fn begin(&mut self, job: ListenJob) -> Result<()> {
        if self.job.is_some() {
            anyhow::bail!("a listening session is already running");
        }
        self.job = Some(job);
        self.state = RecognitionState::Listening;
        Ok(())
    }

    /// Manual toggle-off: short-circuit the silence timer.
    pub fn request_stop(&mut self) {
        if let Some(job) = self.job.as_ref() {
            job.request_stop();
            self.state = RecognitionState::Stopping;
        }
    }

    /// Non-blocking poll. Returns the session outcome once, transitioning
    /// back to `Idle` and joining the worker.
    pub fn poll(&mut self) -> Option<ListenOutcome> {
        let outcome = match self.job.as_ref() {
            Some(job) => match job.receiver.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(mpsc::TryRecvError::Empty) => None,
                Err(mpsc::TryRecvError::Disconnected) => Some(ListenOutcome::Error(
                    "listening worker disconnected unexpectedly".to_string(),
                )),
            },
            None => None,
        }?;

        if let Some(mut job) = self.job.take() {
            if let Some(handle) = job.handle.take() {
                let _ = handle.join();
            }
        }
        self.state = RecognitionState::Idle;
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_fake_job(outcome: Option<ListenOutcome>) -> VoiceManager {
        let (tx, rx) = mpsc::sync_channel(1);
        if let Some(outcome) = outcome {
            tx.send(outcome).expect("send outcome");
        }
        let mut manager = VoiceManager::new();
        manager
            .begin(ListenJob {
                receiver: rx,
                handle: Some(thread::spawn(|| {})),
                stop_flag: Arc::new(AtomicBool::new(false)),
            })
            .expect("begin session");
        // Keep the sender alive for the pending case.
        std::mem::forget(tx);
        manager
    }

    #[test]
    fn sanitize_removes_non_speech_markers() {
        assert_eq!(sanitize_transcript(" [silence] call help "), "call help");
        assert_eq!(sanitize_transcript("(noise)  my chest  hurts"), "my chest hurts");
        assert_eq!(sanitize_transcript("[BLANK_AUDIO]"), "");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_transcript("  a \n b   c "), "a b c");
    }

    #[test]
    fn manager_walks_idle_listening_idle() {
        let mut manager = manager_with_fake_job(Some(ListenOutcome::Transcript("hi".into())));
        assert_eq!(manager.state(), RecognitionState::Listening);
        assert_eq!(
            manager.poll(),
            Some(ListenOutcome::Transcript("hi".to_string()))
        );
        assert_eq!(manager.state(), RecognitionState::Idle);
        assert_eq!(manager.poll(), None);
    }

    #[test]
    fn manager_refuses_overlapping_sessions() {
        let mut manager = manager_with_fake_job(None);
        let (_tx, rx) = mpsc::sync_channel(1);
        let second = ListenJob {
            receiver: rx,
            handle: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        };
        assert!(manager.begin(second).is_err());
    }

    #[test]
    fn request_stop_transitions_to_stopping() {
        let mut manager = manager_with_fake_job(None);
        manager.request_stop();
        assert_eq!(manager.state(), RecognitionState::Stopping);
        assert_eq!(manager.poll(), None);
    }
}
