//! Conversation state and the per-send streaming session.
//!
//! The conversation is an append-only sequence of messages; during an active
//! stream the trailing assistant message is the only mutable entry and is
//! rewritten on every chunk. `StreamSession` owns the raw response buffer for
//! one send and applies the directive extractor to it.

use crate::directive::{self, Extraction};
use serde::{Deserialize, Serialize};

/// Opening line seeded into a fresh general-mode conversation.
pub const GENERAL_GREETING: &str = "Hello! I'm Dr. Samantha. How can I help you today?";
/// Model label shown for the general-mode greeting.
pub const GENERAL_GREETING_MODEL: &str = "sethuiyer/Dr_Samantha-7b";
/// Opening line seeded when emergency mode begins.
pub const EMERGENCY_OPENING: &str = "EMERGENCY PROTOCOL INITIATED. \nIs the patient conscious?";
/// Quick replies offered alongside the emergency opening.
pub const EMERGENCY_OPENING_OPTIONS: [&str; 2] = ["Yes", "No"];
/// Fixed text appended as an assistant message when a send fails.
pub const SEND_FAILURE_TEXT: &str =
    "Connection error. Please verify your internet connection and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One conversation entry. `model` labels which backend model produced an
/// assistant message, when the server reported one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            model: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Conversation context sent with every chat request. Affects the seed
/// messages and the request's `mode` field, not the extraction protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    General,
    Emergency,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::General => "general",
            Mode::Emergency => "emergency",
        }
    }
}

/// Role + content pair, the shape the chat endpoint expects for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Ordered message sequence. Only ever appended to, or mutated at its tail
/// while a stream is active; reset wholesale on mode transitions.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all messages with the opening seed for `mode`.
    pub fn reset_for_mode(&mut self, mode: Mode) {
        self.messages.clear();
        let seed = match mode {
            Mode::General => {
                Message::assistant(GENERAL_GREETING).with_model(GENERAL_GREETING_MODEL)
            }
            Mode::Emergency => Message::assistant(EMERGENCY_OPENING).with_model("System"),
        };
        self.messages.push(seed);
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Snapshot of the history in wire shape, taken before the user message
    /// of the in-flight send is appended by the caller.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.messages
            .iter()
            .map(|m| HistoryEntry {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Rewrite the in-progress assistant message (the tail entry) with the
    /// latest display text. No-op if the tail is not an assistant message.
    pub fn update_streaming_content(&mut self, content: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant {
                last.content.clear();
                last.content.push_str(content);
            }
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// What one chunk did to the session, for the caller to apply to visible
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Full display text for the in-progress assistant message.
    pub display: String,
    /// Replacement quick replies, if this re-parse produced a directive.
    pub options: Option<Vec<String>>,
    /// True exactly once per session, when the trigger phrase first appears.
    pub start_metronome: bool,
}

/// Per-send state: the monotonically growing raw buffer, the one-shot
/// metronome flag, and completion. Lifetime is a single outbound message's
/// response; a new send discards it.
#[derive(Debug, Default)]
pub struct StreamSession {
    buffer: String,
    metronome_fired: bool,
    completed: bool,
}

impl StreamSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a decoded chunk and re-run extraction over the whole buffer.
    pub fn apply_chunk(&mut self, chunk: &str) -> ChunkOutcome {
        self.buffer.push_str(chunk);

        let start_metronome =
            !self.metronome_fired && directive::contains_metronome_trigger(&self.buffer);
        if start_metronome {
            self.metronome_fired = true;
        }

        let Extraction { display, options } = directive::extract(&self.buffer);
        ChunkOutcome {
            display,
            options,
            start_metronome,
        }
    }

    /// Display text for the final buffer, directive stripped; used for
    /// speech output after the stream completes.
    pub fn final_display(&self) -> String {
        directive::extract(&self.buffer).display
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(session: &mut StreamSession, chunks: &[&str]) -> Vec<ChunkOutcome> {
        chunks.iter().map(|c| session.apply_chunk(c)).collect()
    }

    #[test]
    fn single_chunk_directive_yields_empty_display_and_options() {
        let mut session = StreamSession::new();
        let out = session.apply_chunk("[OPTIONS:Yes|No]");
        assert_eq!(out.display, "");
        assert_eq!(
            out.options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
        assert!(!out.start_metronome);
    }

    #[test]
    fn directive_split_across_chunks_converges() {
        let mut session = StreamSession::new();
        let outcomes = apply_all(&mut session, &["Let's check. [OPTIONS: Ye", "s | No]"]);

        assert_eq!(outcomes[0].display, "Let's check. ");
        assert_eq!(outcomes[1].display, "Let's check. ");
        assert_eq!(
            outcomes[1].options,
            Some(vec!["Yes".to_string(), "No".to_string()])
        );
    }

    #[test]
    fn directive_split_at_every_boundary_converges() {
        let full = "Stay calm. [OPTIONS: A | B] Done.";
        for split in 1..full.len() {
            if !full.is_char_boundary(split) {
                continue;
            }
            let mut session = StreamSession::new();
            session.apply_chunk(&full[..split]);
            let out = session.apply_chunk(&full[split..]);
            assert_eq!(out.display, "Stay calm.  Done.", "split at {split}");
            assert_eq!(
                out.options,
                Some(vec!["A".to_string(), "B".to_string()]),
                "split at {split}"
            );
        }
    }

    #[test]
    fn metronome_trigger_fires_exactly_once_per_session() {
        let mut session = StreamSession::new();
        let outcomes = apply_all(
            &mut session,
            &["Okay, starting metr", "onome now.", " starting metronome again"],
        );
        assert!(!outcomes[0].start_metronome);
        assert!(outcomes[1].start_metronome);
        assert!(!outcomes[2].start_metronome);
    }

    #[test]
    fn final_display_strips_unterminated_directive() {
        let mut session = StreamSession::new();
        session.apply_chunk("Hold on. [OPTIONS: Yes | N");
        assert_eq!(session.final_display(), "Hold on. ");
    }

    #[test]
    fn conversation_reset_seeds_general_greeting() {
        let mut convo = Conversation::new();
        convo.push(Message::user("hi"));
        convo.reset_for_mode(Mode::General);
        assert_eq!(convo.len(), 1);
        assert_eq!(convo.messages()[0].content, GENERAL_GREETING);
        assert_eq!(
            convo.messages()[0].model.as_deref(),
            Some(GENERAL_GREETING_MODEL)
        );
    }

    #[test]
    fn conversation_reset_seeds_emergency_opening() {
        let mut convo = Conversation::new();
        convo.reset_for_mode(Mode::Emergency);
        assert_eq!(convo.messages()[0].content, EMERGENCY_OPENING);
        assert_eq!(convo.messages()[0].model.as_deref(), Some("System"));
    }

    #[test]
    fn update_streaming_content_rewrites_only_assistant_tail() {
        let mut convo = Conversation::new();
        convo.push(Message::assistant(""));
        convo.update_streaming_content("partial");
        assert_eq!(convo.messages()[0].content, "partial");

        convo.push(Message::user("question"));
        convo.update_streaming_content("ignored");
        assert_eq!(convo.messages()[1].content, "question");
    }

    #[test]
    fn history_preserves_order_and_roles() {
        let mut convo = Conversation::new();
        convo.push(Message::assistant("hello"));
        convo.push(Message::user("hurt ankle"));
        let history = convo.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[1].content, "hurt ankle");
    }

    #[test]
    fn roles_serialize_lowercase_for_the_wire() {
        let entry = HistoryEntry {
            role: Role::Assistant,
            content: "ok".to_string(),
        };
        let json = serde_json::to_string(&entry).expect("serialize");
        assert!(json.contains("\"role\":\"assistant\""));
    }
}
