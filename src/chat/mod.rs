//! Streaming chat client and its background worker job.
//!
//! One send = one worker thread. The worker opens the HTTP stream, reports
//! the response headers, then forwards decoded chunks over a channel in
//! arrival order. The UI thread drains the channel and owns all state; the
//! worker never touches application state directly.

mod decode;

pub use decode::Utf8Decoder;

use crate::conversation::{HistoryEntry, Mode};
use crate::log_debug;
use serde::Serialize;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Response header naming a client action the backend suggests.
pub const SUGGESTED_ACTION_HEADER: &str = "X-Suggested-Action";
/// Response header labeling the model that produced the reply.
pub const MODEL_HEADER: &str = "X-Model";

const READ_BUF_BYTES: usize = 8 * 1024;

/// JSON body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub mode: Mode,
    pub user_id: Option<String>,
    pub history: Vec<HistoryEntry>,
}

/// Failures surfaced by the chat transport. A non-success status is a hard
/// failure for that send, same as an unreachable network.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat stream read failed: {0}")]
    Read(#[from] std::io::Error),
    #[error("chat endpoint returned status {status}")]
    Status { status: u16 },
}

/// Blocking HTTP client for the chat endpoint. The request timeout is left
/// unset because a healthy response is an open-ended stream; only the
/// connect phase is bounded.
pub struct ChatClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, ChatError> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(None)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST the request and return the open stream once headers are in.
    pub fn open_stream(&self, request: &ChatRequest) -> Result<ChatStream, ChatError> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Status {
                status: status.as_u16(),
            });
        }

        let suggested_action = header_value(&response, SUGGESTED_ACTION_HEADER);
        let model = header_value(&response, MODEL_HEADER);

        Ok(ChatStream {
            response,
            decoder: Utf8Decoder::new(),
            suggested_action,
            model,
        })
    }
}

fn header_value(response: &reqwest::blocking::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// An open chat response: headers already parsed, body consumed as decoded
/// text chunks in arrival order.
pub struct ChatStream {
    response: reqwest::blocking::Response,
    decoder: Utf8Decoder,
    pub suggested_action: Option<String>,
    pub model: Option<String>,
}

impl ChatStream {
    /// Next decoded chunk, or `None` at end of stream. Reads that yield only
    /// a carried partial multi-byte sequence loop until there is text.
    pub fn next_chunk(&mut self) -> Result<Option<String>, ChatError> {
        let mut buf = [0u8; READ_BUF_BYTES];
        loop {
            let n = self.response.read(&mut buf)?;
            if n == 0 {
                let tail = self.decoder.finish();
                return Ok(if tail.is_empty() { None } else { Some(tail) });
            }
            let text = self.decoder.decode(&buf[..n]);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }
}

/// Messages sent from the stream worker back to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Response headers are available; the stream is live.
    Started {
        suggested_action: Option<String>,
        model: Option<String>,
    },
    /// One decoded chunk of assistant text.
    Chunk(String),
    /// Stream ended normally.
    Completed,
    /// Transport failure or non-success status; terminal for this send.
    Failed(String),
}

/// Handle the UI uses to poll the stream worker.
pub struct ChatJob {
    pub receiver: mpsc::Receiver<ChatEvent>,
    pub handle: Option<thread::JoinHandle<()>>,
    stop_flag: Arc<AtomicBool>,
}

impl ChatJob {
    /// Abandon the in-flight stream. The worker drops the connection and
    /// exits without emitting further events.
    pub fn abandon(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Spawn the worker thread for one send.
pub fn start_chat_job(client: Arc<ChatClient>, request: ChatRequest) -> ChatJob {
    let (tx, rx) = mpsc::channel();
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop = stop_flag.clone();

    let handle = thread::spawn(move || {
        run_stream_worker(&client, &request, &tx, &stop);
    });

    ChatJob {
        receiver: rx,
        handle: Some(handle),
        stop_flag,
    }
}

fn run_stream_worker(
    client: &ChatClient,
    request: &ChatRequest,
    tx: &mpsc::Sender<ChatEvent>,
    stop: &AtomicBool,
) {
    let mut stream = match client.open_stream(request) {
        Ok(stream) => stream,
        Err(err) => {
            log_debug(&format!("chat send failed before streaming: {err}"));
            let _ = tx.send(ChatEvent::Failed(err.to_string()));
            return;
        }
    };

    if tx
        .send(ChatEvent::Started {
            suggested_action: stream.suggested_action.take(),
            model: stream.model.take(),
        })
        .is_err()
    {
        return;
    }

    loop {
        if stop.load(Ordering::Relaxed) {
            // Abandoned: drop the connection, update nothing.
            return;
        }
        match stream.next_chunk() {
            Ok(Some(text)) => {
                if tx.send(ChatEvent::Chunk(text)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = tx.send(ChatEvent::Completed);
                return;
            }
            Err(err) => {
                log_debug(&format!("chat stream read error: {err}"));
                let _ = tx.send(ChatEvent::Failed(err.to_string()));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

    fn drain(job: &ChatJob) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = job.receiver.recv_timeout(Duration::from_secs(5)) {
            let terminal = matches!(event, ChatEvent::Completed | ChatEvent::Failed(_));
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    #[test]
    fn successful_send_reports_headers_then_chunks_then_completed() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header(SUGGESTED_ACTION_HEADER, "start_metronome")
            .with_header(MODEL_HEADER, "Meta-Llama-3.1-8B-Instruct")
            .with_body("Apply pressure. [OPTIONS: Yes | No]")
            .create();

        let client =
            Arc::new(ChatClient::new(&server.url(), CONNECT_TIMEOUT).expect("client builds"));
        let request = ChatRequest {
            message: "bleeding".to_string(),
            mode: Mode::Emergency,
            user_id: Some("7".to_string()),
            history: Vec::new(),
        };

        let mut job = start_chat_job(client, request);
        let events = drain(&job);
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }
        mock.assert();

        assert!(matches!(
            &events[0],
            ChatEvent::Started { suggested_action, model }
                if suggested_action.as_deref() == Some("start_metronome")
                    && model.as_deref() == Some("Meta-Llama-3.1-8B-Instruct")
        ));
        let body: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::Chunk(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(body, "Apply pressure. [OPTIONS: Yes | No]");
        assert!(matches!(events.last(), Some(ChatEvent::Completed)));
    }

    #[test]
    fn empty_suggested_action_header_reads_as_none() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header(SUGGESTED_ACTION_HEADER, "")
            .with_body("ok")
            .create();

        let client = ChatClient::new(&server.url(), CONNECT_TIMEOUT).expect("client builds");
        let request = ChatRequest {
            message: "hi".to_string(),
            mode: Mode::General,
            user_id: None,
            history: Vec::new(),
        };
        let stream = client.open_stream(&request).expect("stream opens");
        assert_eq!(stream.suggested_action, None);
    }

    #[test]
    fn non_success_status_is_a_hard_failure() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(503)
            .with_body("overloaded")
            .create();

        let client =
            Arc::new(ChatClient::new(&server.url(), CONNECT_TIMEOUT).expect("client builds"));
        let request = ChatRequest {
            message: "hello".to_string(),
            mode: Mode::General,
            user_id: None,
            history: Vec::new(),
        };

        let mut job = start_chat_job(client, request);
        let events = drain(&job);
        if let Some(handle) = job.handle.take() {
            let _ = handle.join();
        }

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ChatEvent::Failed(reason) if reason.contains("503")));
    }

    #[test]
    fn request_serializes_mode_and_history_in_wire_shape() {
        let request = ChatRequest {
            message: "help".to_string(),
            mode: Mode::Emergency,
            user_id: None,
            history: vec![HistoryEntry {
                role: crate::conversation::Role::User,
                content: "hi".to_string(),
            }],
        };
        let json = serde_json::to_value(&request).expect("serialize");
        assert_eq!(json["mode"], "emergency");
        assert_eq!(json["user_id"], serde_json::Value::Null);
        assert_eq!(json["history"][0]["role"], "user");
    }
}
