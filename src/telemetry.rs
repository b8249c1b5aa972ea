//! JSON-lines tracing output, enabled together with file logging.

use crate::config::AppConfig;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Trace destination; overridable for test runs and support bundles.
pub fn tracing_log_path() -> PathBuf {
    std::env::var("AIDTERM_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("aidterm_trace.jsonl"))
}

/// Install the global JSON subscriber once, writing to the trace file.
/// Quiet failure: a missing or unwritable file just means no telemetry.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs || !(config.logs || config.log_timings) {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let Ok(file) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(tracing_log_path())
        else {
            return;
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::sync::Mutex::new(file))
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
