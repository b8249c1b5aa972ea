//! File-backed debug logging.
//!
//! The TUI owns the terminal, so diagnostics go to size-capped files in the
//! temp directory instead of stdout/stderr. Content-bearing lines (messages,
//! transcripts) are gated separately so default logs stay free of user data.

use crate::config::AppConfig;
use std::{
    env, fs,
    io::Write,
    panic,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, OnceLock,
    },
    time::{SystemTime, UNIX_EPOCH},
};

const LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;
const CRASH_LOG_MAX_BYTES: u64 = 256 * 1024;

static LOG_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_CONTENT_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_WRITER: OnceLock<Mutex<Option<CappedLog>>> = OnceLock::new();

/// Path to the debug log, rotated when it outgrows its cap.
pub fn log_file_path() -> PathBuf {
    env::temp_dir().join("aidterm_tui.log")
}

/// Path to the crash log (panic metadata only).
pub fn crash_log_path() -> PathBuf {
    env::temp_dir().join("aidterm_crash.log")
}

/// Append-only log file that truncates itself instead of growing forever.
struct CappedLog {
    path: PathBuf,
    file: fs::File,
    max_bytes: u64,
    written: u64,
}

impl CappedLog {
    fn open(path: PathBuf, max_bytes: u64) -> Option<Self> {
        let mut written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if written > max_bytes {
            let _ = fs::remove_file(&path);
            written = 0;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        Some(Self {
            path,
            file,
            max_bytes,
            written,
        })
    }

    fn write_line(&mut self, line: &str) {
        if self.written.saturating_add(line.len() as u64) > self.max_bytes {
            if let Ok(file) = fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
            {
                self.file = file;
                self.written = 0;
            }
        }
        if self.file.write_all(line.as_bytes()).is_ok() {
            self.written = self.written.saturating_add(line.len() as u64);
        }
    }
}

fn writer() -> &'static Mutex<Option<CappedLog>> {
    LOG_WRITER.get_or_init(|| Mutex::new(None))
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Configure logging from CLI flags and environment.
pub fn init_logging(config: &AppConfig) {
    let enabled = (config.logs || config.log_timings) && !config.no_logs;
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && config.log_content, Ordering::Relaxed);

    let mut guard = writer().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = enabled.then(|| CappedLog::open(log_file_path(), LOG_MAX_BYTES)).flatten();
}

/// Write a debug line. No-op unless logging is enabled.
pub fn log_debug(msg: &str) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let line = format!("[{}] {msg}\n", timestamp());
    let mut guard = writer().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(log) = guard.as_mut() {
        log.write_line(&line);
    }
}

/// Write a line that may contain user content; gated behind `--log-content`.
pub fn log_debug_content(msg: &str) {
    if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        log_debug(msg);
    }
}

/// Record a panic to the crash log. Payload text is withheld unless content
/// logging was explicitly enabled.
pub fn log_panic(info: &panic::PanicHookInfo<'_>) {
    if !LOG_ENABLED.load(Ordering::Relaxed) {
        return;
    }

    let location = info
        .location()
        .map(|loc| format!("{}:{}", loc.file(), loc.line()))
        .unwrap_or_else(|| "unknown".to_string());
    let payload = if LOG_CONTENT_ENABLED.load(Ordering::Relaxed) {
        if let Some(text) = info.payload().downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = info.payload().downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        }
    } else {
        "panic payload omitted (log-content disabled)".to_string()
    };

    let line = format!(
        "[{}] panic at {location}: {payload} (v{})\n",
        timestamp(),
        env!("CARGO_PKG_VERSION")
    );
    if let Some(mut log) = CappedLog::open(crash_log_path(), CRASH_LOG_MAX_BYTES) {
        log.write_line(&line);
    }
}

#[cfg(test)]
pub(crate) fn set_logging_for_tests(enabled: bool, content_enabled: bool) {
    LOG_ENABLED.store(enabled, Ordering::Relaxed);
    LOG_CONTENT_ENABLED.store(enabled && content_enabled, Ordering::Relaxed);
    let mut guard = writer().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = enabled.then(|| CappedLog::open(log_file_path(), LOG_MAX_BYTES)).flatten();
}
