use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::api::geo::{start_locate_job, GeoProvider, LocateJob, Location};
use crate::api::session::UserSession;
use crate::api::{ApiClient, ApiError, MedicalProfile, SignupRequest};
use crate::audio::{Metronome, Recorder};
use crate::chat::{start_chat_job, ChatClient, ChatEvent, ChatJob, ChatRequest};
use crate::config::AppConfig;
use crate::conversation::{
    Conversation, Message, Mode, StreamSession, EMERGENCY_OPENING_OPTIONS, SEND_FAILURE_TEXT,
};
use crate::log_debug;
use crate::stt::Transcriber;
use crate::voice::{start_listen_job, ListenOutcome, RecognitionState, Speaker, VoiceManager};
use anyhow::{Context, Result};

/// Maximum characters retained in the input buffer.
pub(super) const INPUT_MAX_CHARS: usize = 8_000;

/// Client action name the backend may suggest via response header.
const ACTION_START_METRONOME: &str = "start_metronome";

macro_rules! state_change {
    ($self:expr, $field:ident, $value:expr) => {{
        $self.$field = $value;
        $self.request_redraw();
    }};
    ($self:expr, $body:block) => {{
        $body
        $self.request_redraw();
    }};
}

/// Send pathway state. One outbound message may be in flight at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Idle,
    /// Submitted; waiting for response headers.
    Sending,
    /// Headers arrived; chunks are being applied.
    Streaming,
}

/// Central application state shared between the event loop, renderer, and
/// worker jobs. All mutation happens on the UI thread; workers only talk to
/// it through channels drained by the `poll_*` methods.
pub struct App {
    config: AppConfig,
    chat_client: Arc<ChatClient>,
    api_client: ApiClient,
    conversation: Conversation,
    mode: Mode,
    input: String,
    quick_replies: Vec<String>,
    status: String,
    send_state: SendState,
    stream: Option<StreamSession>,
    chat_job: Option<ChatJob>,
    voice: VoiceManager,
    speaker: Option<Speaker>,
    voice_output_enabled: bool,
    metronome: Metronome,
    locate_job: Option<LocateJob>,
    session: UserSession,
    audio_recorder: Option<Arc<Mutex<Recorder>>>,
    transcriber: Option<Arc<Mutex<Transcriber>>>,
    scroll_offset: u16,
    needs_redraw: bool,
    send_started_at: Option<Instant>,
}

impl App {
    /// Create the application state with the general-mode greeting seeded.
    pub fn new(config: AppConfig) -> Result<Self> {
        let chat_client = Arc::new(
            ChatClient::new(&config.base_url, config.connect_timeout())
                .context("failed to build chat client")?,
        );
        let api_client = ApiClient::new(&config.base_url, config.api_timeout())
            .context("failed to build API client")?;
        let session = UserSession::load(&config.session_file_path());
        let speaker = match Speaker::new(&config.speak_command(), config.voice_preferences()) {
            Ok(speaker) => Some(speaker),
            Err(err) => {
                log_debug(&format!("voice output unavailable: {err:#}"));
                None
            }
        };
        let metronome = Metronome::new(config.metronome_interval(), config.metronome_frequency_hz);

        let mut conversation = Conversation::new();
        conversation.reset_for_mode(Mode::General);

        Ok(Self {
            config,
            chat_client,
            api_client,
            conversation,
            mode: Mode::General,
            input: String::new(),
            quick_replies: Vec::new(),
            status: "Ready. Enter sends, Ctrl+R listens, Ctrl+E starts emergency guidance.".into(),
            send_state: SendState::Idle,
            stream: None,
            chat_job: None,
            voice: VoiceManager::new(),
            speaker,
            voice_output_enabled: false,
            metronome,
            locate_job: None,
            session,
            audio_recorder: None,
            transcriber: None,
            scroll_offset: 0,
            needs_redraw: true,
            send_started_at: None,
        })
    }

    // --- send pathway -----------------------------------------------------

    /// Submit whatever is in the input box: a `/command` or a chat message.
    pub fn submit_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            state_change!(self, status, "Nothing to send; input is empty.".into());
            return;
        }
        if let Some(command) = text.strip_prefix('/') {
            let command = command.to_string();
            state_change!(self, {
                self.input.clear();
            });
            self.run_command(&command);
            return;
        }
        self.send_message(text);
    }

    /// Start one send. Refused while another send is in flight; empty text
    /// is a no-op with no message appended and no network call.
    pub fn send_message(&mut self, text: String) {
        if self.chat_job.is_some() {
            state_change!(
                self,
                status,
                "A response is already streaming; wait for it to finish.".into()
            );
            return;
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }

        // History snapshot excludes the message being sent; it travels in
        // the `message` field.
        let history = self.conversation.history();
        let request = ChatRequest {
            message: text.clone(),
            mode: self.mode,
            user_id: self.session.user_id.clone(),
            history,
        };

        state_change!(self, {
            self.conversation.push(Message::user(text));
            self.quick_replies.clear();
            self.input.clear();
            self.stream = Some(StreamSession::new());
            self.send_state = SendState::Sending;
            self.status = "Sending...".into();
            self.send_started_at = Some(Instant::now());
        });
        tracing::info!(mode = self.mode.as_str(), "chat send started");
        self.chat_job = Some(start_chat_job(self.chat_client.clone(), request));
        self.scroll_to_bottom();
    }

    /// Send the quick reply at `index`, if one is offered.
    pub fn select_quick_reply(&mut self, index: usize) {
        let Some(option) = self.quick_replies.get(index).cloned() else {
            return;
        };
        self.send_message(option);
    }

    /// Drain pending stream events and apply them in arrival order.
    pub fn poll_chat_job(&mut self) {
        let Some(job) = self.chat_job.as_ref() else {
            return;
        };

        let mut events = Vec::new();
        let mut disconnected = false;
        loop {
            match job.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(std::sync::mpsc::TryRecvError::Empty) => break,
                Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                    disconnected = true;
                    break;
                }
            }
        }

        let mut finished = false;
        for event in events {
            if self.handle_chat_event(event) {
                finished = true;
            }
        }
        if disconnected && !finished {
            log_debug("chat worker disconnected without a terminal event");
            self.fail_send();
            finished = true;
        }

        if finished {
            if let Some(mut job) = self.chat_job.take() {
                if let Some(handle) = job.handle.take() {
                    let _ = handle.join();
                }
            }
        }
    }

    /// Apply one stream event; returns true for terminal events.
    fn handle_chat_event(&mut self, event: ChatEvent) -> bool {
        match event {
            ChatEvent::Started {
                suggested_action,
                model,
            } => {
                let mut placeholder = Message::assistant("");
                if let Some(model) = model {
                    placeholder = placeholder.with_model(model);
                }
                state_change!(self, {
                    self.conversation.push(placeholder);
                    self.send_state = SendState::Streaming;
                    self.status = "Receiving...".into();
                });
                match suggested_action.as_deref() {
                    None => {}
                    Some(ACTION_START_METRONOME) => self.start_metronome(),
                    Some(other) => log_debug(&format!("ignoring suggested action '{other}'")),
                }
                false
            }
            ChatEvent::Chunk(text) => {
                let Some(stream) = self.stream.as_mut() else {
                    return false;
                };
                let outcome = stream.apply_chunk(&text);
                state_change!(self, {
                    self.conversation.update_streaming_content(&outcome.display);
                    if let Some(options) = outcome.options {
                        self.quick_replies = options;
                    }
                });
                if outcome.start_metronome {
                    self.start_metronome();
                }
                self.scroll_to_bottom();
                false
            }
            ChatEvent::Completed => {
                if let Some(stream) = self.stream.as_mut() {
                    stream.mark_completed();
                }
                let final_display = self
                    .stream
                    .take()
                    .map(|stream| stream.final_display())
                    .unwrap_or_default();
                state_change!(self, {
                    self.send_state = SendState::Idle;
                    self.status = "Ready.".into();
                });
                if let Some(started) = self.send_started_at.take() {
                    if self.config.log_timings {
                        log_debug(&format!(
                            "timing|phase=chat_send|total_s={:.3}",
                            started.elapsed().as_secs_f64()
                        ));
                    }
                }
                tracing::info!("chat send completed");
                if self.voice_output_enabled {
                    if let Some(speaker) = self.speaker.as_mut() {
                        speaker.speak(&final_display);
                    }
                }
                true
            }
            ChatEvent::Failed(reason) => {
                log_debug(&format!("chat send failed: {reason}"));
                tracing::warn!(reason = reason.as_str(), "chat send failed");
                self.fail_send();
                true
            }
        }
    }

    /// Terminal failure path: one fixed-text assistant message, no retry.
    fn fail_send(&mut self) {
        state_change!(self, {
            self.stream = None;
            self.send_state = SendState::Idle;
            self.conversation.push(Message::assistant(SEND_FAILURE_TEXT));
            self.status = "Send failed; you can resend manually.".into();
        });
        self.send_started_at = None;
        self.scroll_to_bottom();
    }

    // --- voice input ------------------------------------------------------

    /// Toggle the listening session: start it, or stop it early and submit
    /// whatever was heard.
    pub fn toggle_listening(&mut self) {
        match self.voice.state() {
            RecognitionState::Idle => self.start_listening(),
            RecognitionState::Listening => {
                self.voice.request_stop();
                state_change!(self, status, "Finishing voice capture...".into());
            }
            RecognitionState::Stopping => {}
        }
    }

    fn start_listening(&mut self) {
        // Capability errors surface at the moment of use, not at startup.
        if self.config.whisper_model_path.is_none() {
            state_change!(
                self,
                status,
                "Voice input needs a Whisper model; pass --whisper-model-path.".into()
            );
            return;
        }
        let transcriber = match self.get_transcriber() {
            Ok(transcriber) => transcriber,
            Err(err) => {
                log_debug(&format!("transcriber unavailable: {err:#}"));
                state_change!(self, status, format!("Voice input unavailable: {err:#}"));
                return;
            }
        };
        let recorder = match self.get_recorder() {
            Ok(recorder) => recorder,
            Err(err) => {
                log_debug(&format!("recorder unavailable: {err:#}"));
                state_change!(self, status, format!("Microphone unavailable: {err:#}"));
                return;
            }
        };

        let job = start_listen_job(recorder, transcriber, self.config.voice_settings());
        if self.voice.begin(job).is_ok() {
            state_change!(self, status, "Listening... press Ctrl+R to send now.".into());
        }
    }

    /// Poll the recognition worker; a transcript feeds the send pathway.
    pub fn poll_voice_job(&mut self) {
        let Some(outcome) = self.voice.poll() else {
            return;
        };
        match outcome {
            ListenOutcome::Transcript(text) => {
                let mut truncated = text;
                if truncated.len() > INPUT_MAX_CHARS {
                    truncated.truncate(INPUT_MAX_CHARS);
                }
                if self.chat_job.is_some() {
                    // Sends are serialized; park the transcript in the input
                    // box instead of dropping it.
                    state_change!(self, {
                        self.input = truncated;
                        self.status = "Transcript ready; send when the current reply finishes.".into();
                    });
                } else {
                    self.send_message(truncated);
                }
            }
            ListenOutcome::Empty => {
                state_change!(self, status, "No speech detected. Try again.".into());
            }
            ListenOutcome::Error(err) => {
                // Aborted session: log only, no user-facing error.
                log_debug(&format!("listening session aborted: {err}"));
                state_change!(self, status, "Ready.".into());
            }
        }
    }

    fn get_recorder(&mut self) -> Result<Arc<Mutex<Recorder>>> {
        if self.audio_recorder.is_none() {
            let recorder = Recorder::new(self.config.input_device.as_deref())?;
            self.audio_recorder = Some(Arc::new(Mutex::new(recorder)));
        }
        Ok(self
            .audio_recorder
            .as_ref()
            .cloned()
            .context("recorder initialized")?)
    }

    /// Load the Whisper model lazily; it is heavy and can take seconds.
    fn get_transcriber(&mut self) -> Result<Arc<Mutex<Transcriber>>> {
        if self.transcriber.is_none() {
            let model_path = self
                .config
                .whisper_model_path
                .clone()
                .context("no whisper model configured")?;
            let transcriber = Transcriber::new(&model_path)?;
            self.transcriber = Some(Arc::new(Mutex::new(transcriber)));
        }
        Ok(self
            .transcriber
            .as_ref()
            .cloned()
            .context("transcriber initialized")?)
    }

    // --- voice output -----------------------------------------------------

    pub fn toggle_voice_output(&mut self) {
        self.voice_output_enabled = !self.voice_output_enabled;
        if !self.voice_output_enabled {
            if let Some(speaker) = self.speaker.as_mut() {
                speaker.stop();
            }
        }
        let note = if self.voice_output_enabled {
            "Voice output enabled."
        } else {
            "Voice output muted."
        };
        state_change!(self, status, note.into());
    }

    pub fn voice_output_enabled(&self) -> bool {
        self.voice_output_enabled
    }

    // --- metronome --------------------------------------------------------

    pub fn start_metronome(&mut self) {
        if self.metronome.is_running() {
            return;
        }
        match self.metronome.start() {
            Ok(()) => {
                state_change!(self, status, "CPR metronome running; push with the clicks.".into());
            }
            Err(err) => {
                log_debug(&format!("metronome start failed: {err:#}"));
                state_change!(self, status, format!("Metronome unavailable: {err:#}"));
            }
        }
    }

    pub fn toggle_metronome(&mut self) {
        if self.metronome.is_running() {
            self.metronome.stop();
            state_change!(self, status, "CPR metronome stopped.".into());
        } else {
            self.start_metronome();
        }
    }

    pub fn metronome_running(&self) -> bool {
        self.metronome.is_running()
    }

    pub fn metronome_compressions(&self) -> usize {
        self.metronome.compressions()
    }

    // --- emergency mode ---------------------------------------------------

    /// Begin the emergency flow: acquire a location fix off-thread, then
    /// switch the conversation into emergency mode.
    pub fn trigger_emergency(&mut self) {
        if self.mode == Mode::Emergency || self.locate_job.is_some() {
            return;
        }
        let provider = GeoProvider::new(&self.config.geo_url, self.config.geo_timeout());
        self.locate_job = Some(start_locate_job(provider));
        state_change!(self, status, "Acquiring location...".into());
    }

    pub fn poll_locate_job(&mut self) {
        let Some(job) = self.locate_job.as_ref() else {
            return;
        };
        let location = match job.receiver.try_recv() {
            Ok(location) => location,
            Err(std::sync::mpsc::TryRecvError::Empty) => return,
            Err(std::sync::mpsc::TryRecvError::Disconnected) => Location::FALLBACK,
        };
        if let Some(mut job) = self.locate_job.take() {
            if let Some(handle) = job.handle.take() {
                let _ = handle.join();
            }
        }
        self.enter_emergency(location);
    }

    /// Reset the conversation into emergency mode. Public so the UI can also
    /// enter without a location fix pending.
    pub fn enter_emergency(&mut self, location: Location) {
        self.abandon_in_flight_send();
        state_change!(self, {
            self.mode = Mode::Emergency;
            self.conversation.reset_for_mode(Mode::Emergency);
            self.quick_replies = EMERGENCY_OPENING_OPTIONS
                .iter()
                .map(|o| o.to_string())
                .collect();
            self.status = if location.is_fallback() {
                "Emergency guidance active. Location unavailable.".to_string()
            } else {
                format!(
                    "Emergency guidance active. Location {:.4}, {:.4} shared with responders.",
                    location.latitude, location.longitude
                )
            };
        });
        tracing::info!(
            latitude = location.latitude,
            longitude = location.longitude,
            "emergency mode entered"
        );
        self.scroll_to_top();
    }

    /// Leave emergency mode and reseed the general greeting.
    pub fn end_emergency(&mut self) {
        if self.mode != Mode::Emergency {
            return;
        }
        self.abandon_in_flight_send();
        self.metronome.stop();
        state_change!(self, {
            self.mode = Mode::General;
            self.conversation.reset_for_mode(Mode::General);
            self.quick_replies.clear();
            self.status = "Emergency ended. Back to general assistance.".into();
        });
        tracing::info!("emergency mode ended");
    }

    /// Mode transitions reset the conversation wholesale; an in-flight
    /// stream is abandoned without updating state.
    fn abandon_in_flight_send(&mut self) {
        if let Some(mut job) = self.chat_job.take() {
            job.abandon();
            if let Some(handle) = job.handle.take() {
                let _ = handle.join();
            }
        }
        self.stream = None;
        self.send_state = SendState::Idle;
        self.send_started_at = None;
    }

    // --- account and profile commands ------------------------------------

    fn run_command(&mut self, command: &str) {
        let words = match shell_words::split(command) {
            Ok(words) => words,
            Err(err) => {
                state_change!(self, status, format!("Bad command: {err}"));
                return;
            }
        };
        match words.first().map(String::as_str) {
            Some("login") if words.len() == 3 => self.login(&words[1], &words[2]),
            Some("signup") if words.len() == 3 => self.signup(&words[1], &words[2]),
            Some("logout") => self.logout(),
            Some("profile") => self.show_profile(),
            Some("emergency") => self.trigger_emergency(),
            Some("general") => self.end_emergency(),
            Some("metronome") => self.toggle_metronome(),
            _ => {
                state_change!(
                    self,
                    status,
                    "Commands: /login USER PASS, /signup USER PASS, /logout, /profile, /emergency, /general, /metronome".into()
                );
            }
        }
    }

    fn login(&mut self, username: &str, password: &str) {
        match self.api_client.login(username, password) {
            Ok(user_id) => {
                self.session.sign_in(user_id);
                self.persist_session();
                state_change!(self, status, format!("Signed in as {username}."));
            }
            Err(err) => self.report_api_error("Login", err),
        }
    }

    fn signup(&mut self, username: &str, password: &str) {
        let request = SignupRequest {
            username: username.to_string(),
            password: password.to_string(),
            profile: MedicalProfile::default(),
        };
        match self.api_client.signup(&request) {
            Ok(()) => {
                state_change!(
                    self,
                    status,
                    format!("Account created; /login {username} to sign in.")
                );
            }
            Err(err) => self.report_api_error("Signup", err),
        }
    }

    fn logout(&mut self) {
        self.session.sign_out();
        self.persist_session();
        state_change!(self, status, "Signed out.".into());
    }

    fn show_profile(&mut self) {
        let Some(user_id) = self.session.user_id.clone() else {
            state_change!(self, status, "Not signed in; /login first.".into());
            return;
        };
        match self.api_client.medical_history(&user_id) {
            Ok(profile) => {
                let summary = format!(
                    "Medical profile on file:\nAllergies: {}\nConditions: {}\nBlood type: {}\nMedications: {}",
                    or_dash(&profile.allergies),
                    or_dash(&profile.conditions),
                    or_dash(&profile.blood_type),
                    or_dash(&profile.medications),
                );
                state_change!(self, {
                    self.conversation
                        .push(Message::assistant(summary).with_model("System"));
                    self.status = "Profile loaded.".into();
                });
                self.scroll_to_bottom();
            }
            Err(err) => self.report_api_error("Profile", err),
        }
    }

    fn report_api_error(&mut self, what: &str, err: ApiError) {
        log_debug(&format!("{what} request failed: {err}"));
        let message = match err {
            ApiError::Rejected { message, .. } => format!("{what} failed: {message}"),
            ApiError::Transport(_) => format!("{what} failed: service unreachable."),
        };
        state_change!(self, status, message);
    }

    fn persist_session(&mut self) {
        if let Err(err) = self.session.save(&self.config.session_file_path()) {
            log_debug(&format!("failed to persist session: {err:#}"));
        }
    }

    pub fn signed_in_user(&self) -> Option<&str> {
        self.session.user_id.as_deref()
    }

    // --- input editing ----------------------------------------------------

    pub fn push_input_char(&mut self, ch: char) {
        if self.input.len() >= INPUT_MAX_CHARS {
            let msg = format!("Input limit reached (max {INPUT_MAX_CHARS} chars).");
            if self.status != msg {
                state_change!(self, status, msg);
            }
            return;
        }
        state_change!(self, {
            self.input.push(ch);
        });
    }

    pub fn backspace_input(&mut self) {
        state_change!(self, {
            self.input.pop();
        });
    }

    pub fn clear_input(&mut self) {
        state_change!(self, {
            self.input.clear();
        });
    }

    // --- housekeeping -----------------------------------------------------

    /// Reap the synthesis child when an utterance finishes.
    pub fn poll_speaker(&mut self) {
        if let Some(speaker) = self.speaker.as_mut() {
            let _ = speaker.state();
        }
    }

    pub fn has_active_jobs(&self) -> bool {
        self.chat_job.is_some() || !self.voice.is_idle() || self.locate_job.is_some()
    }

    /// Release workers and devices on the way out. Abandoned streams update
    /// nothing.
    pub fn shutdown(&mut self) {
        self.abandon_in_flight_send();
        // A live listening session is told to stop but not waited for; its
        // worker dies with the process.
        self.voice.request_stop();
        let _ = self.voice.poll();
        if let Some(speaker) = self.speaker.as_mut() {
            speaker.stop();
        }
        self.metronome.stop();
    }

    // --- accessors for the renderer --------------------------------------

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn quick_replies(&self) -> &[String] {
        &self.quick_replies
    }

    pub fn input_text(&self) -> &str {
        &self.input
    }

    pub fn status_text(&self) -> &str {
        &self.status
    }

    pub fn send_state(&self) -> SendState {
        self.send_state
    }

    pub fn recognition_state(&self) -> RecognitionState {
        self.voice.state()
    }

    pub fn scroll_offset(&self) -> u16 {
        self.scroll_offset
    }

    pub fn scroll_up(&mut self) {
        if self.scroll_offset > 0 {
            state_change!(self, scroll_offset, self.scroll_offset.saturating_sub(1));
        }
    }

    pub fn scroll_down(&mut self) {
        state_change!(self, scroll_offset, self.scroll_offset.saturating_add(1));
    }

    pub fn scroll_to_top(&mut self) {
        state_change!(self, scroll_offset, 0);
    }

    pub fn scroll_to_bottom(&mut self) {
        let lines = self.conversation.len().saturating_mul(3);
        let offset = lines.saturating_sub(10).min(u16::MAX as usize);
        state_change!(self, scroll_offset, offset as u16);
    }

    pub fn request_redraw(&mut self) {
        self.needs_redraw = true;
    }

    pub fn take_redraw_request(&mut self) -> bool {
        let requested = self.needs_redraw;
        self.needs_redraw = false;
        requested
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
