//! End-to-end exercise of the chat transport feeding the per-send session:
//! open a real (mock) HTTP stream, drain worker events in arrival order,
//! and check the display/quick-reply invariants.

use aidterm::chat::{start_chat_job, ChatClient, ChatEvent, ChatRequest};
use aidterm::conversation::{Mode, StreamSession};
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        mode: Mode::Emergency,
        user_id: None,
        history: Vec::new(),
    }
}

fn run_session(server_url: &str, message: &str) -> (StreamSession, Vec<ChatEvent>, String, Vec<String>) {
    let client = Arc::new(ChatClient::new(server_url, CONNECT_TIMEOUT).expect("client builds"));
    let mut job = start_chat_job(client, request(message));

    let mut session = StreamSession::new();
    let mut events = Vec::new();
    let mut display = String::new();
    let mut options = Vec::new();
    loop {
        let event = job
            .receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("worker stays alive");
        if let ChatEvent::Chunk(text) = &event {
            let outcome = session.apply_chunk(text);
            display = outcome.display;
            if let Some(new_options) = outcome.options {
                options = new_options;
            }
        }
        let terminal = matches!(event, ChatEvent::Completed | ChatEvent::Failed(_));
        events.push(event);
        if terminal {
            break;
        }
    }
    if let Some(handle) = job.handle.take() {
        let _ = handle.join();
    }
    (session, events, display, options)
}

#[test]
fn directive_split_across_network_chunks_converges() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_chunked_body(|writer| {
            writer.write_all("Let's check. [OPTIONS: Ye".as_bytes())?;
            writer.flush()?;
            std::thread::sleep(Duration::from_millis(50));
            writer.write_all("s | No]".as_bytes())
        })
        .create();

    let (session, events, display, options) = run_session(&server.url(), "bleeding badly");

    assert!(matches!(events.last(), Some(ChatEvent::Completed)));
    assert_eq!(display, "Let's check. ");
    assert_eq!(options, ["Yes", "No"]);
    assert!(!session.final_display().contains("[OPTIONS"));
}

#[test]
fn trigger_phrase_split_across_chunks_fires_once() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_chunked_body(|writer| {
            writer.write_all(b"Okay. Starting metr")?;
            writer.flush()?;
            std::thread::sleep(Duration::from_millis(50));
            writer.write_all(b"onome now. starting metronome")
        })
        .create();

    let client =
        Arc::new(ChatClient::new(&server.url(), CONNECT_TIMEOUT).expect("client builds"));
    let mut job = start_chat_job(client, request("yes start cpr"));

    let mut session = StreamSession::new();
    let mut fires = 0;
    loop {
        match job.receiver.recv_timeout(Duration::from_secs(5)).expect("event") {
            ChatEvent::Chunk(text) => {
                if session.apply_chunk(&text).start_metronome {
                    fires += 1;
                }
            }
            ChatEvent::Completed | ChatEvent::Failed(_) => break,
            ChatEvent::Started { .. } => {}
        }
    }
    if let Some(handle) = job.handle.take() {
        let _ = handle.join();
    }
    assert_eq!(fires, 1);
}

#[test]
fn multibyte_text_survives_arbitrary_chunk_boundaries() {
    let body = "Très bien — ça va? [OPTIONS: Oui | Non]";
    let bytes = body.as_bytes().to_vec();
    // Split right before the continuation byte of "è" so the first network
    // chunk ends mid-character.
    let split = bytes
        .iter()
        .position(|b| *b == 0xA8)
        .unwrap_or(bytes.len() / 2);

    let mut server = mockito::Server::new();
    let first = bytes[..split].to_vec();
    let second = bytes[split..].to_vec();
    let _mock = server
        .mock("POST", "/api/chat")
        .with_status(200)
        .with_chunked_body(move |writer| {
            writer.write_all(&first)?;
            writer.flush()?;
            std::thread::sleep(Duration::from_millis(50));
            writer.write_all(&second)
        })
        .create();

    let (_, _, display, options) = run_session(&server.url(), "salut");
    assert_eq!(display, "Très bien — ça va? ");
    assert_eq!(options, ["Oui", "Non"]);
}
