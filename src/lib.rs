pub mod api;
mod app;
pub mod audio;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod directive;
pub mod stt;
mod telemetry;
pub mod terminal_restore;
pub mod text;
pub mod ui;
pub mod voice;

pub use app::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic, App,
    SendState,
};
pub use telemetry::{init_tracing, tracing_log_path};
