//! Local speech-to-text via whisper.cpp.
//!
//! The ggml model is loaded once and reused for every listening session;
//! loading takes seconds and must not happen per utterance.

#[cfg(unix)]
mod platform {
    use crate::config::VoiceSettings;
    use crate::log_debug;
    use anyhow::{anyhow, Context, Result};
    use std::io;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::os::unix::io::AsRawFd;
    use std::sync::Once;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    /// Loaded Whisper model. Create once, share behind a mutex.
    pub struct Transcriber {
        ctx: WhisperContext,
    }

    impl Transcriber {
        /// Load the model from disk. whisper.cpp prints initialization noise
        /// to stderr, which would corrupt the TUI, so stderr is parked on
        /// /dev/null for the duration of the load.
        pub fn new(model_path: &str) -> Result<Self> {
            install_log_silencer();
            let ctx = with_stderr_silenced(|| {
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default())
            })?
            .context("failed to load whisper model")?;
            Ok(Self { ctx })
        }

        /// Transcribe 16 kHz mono PCM and return the stitched text.
        pub fn transcribe(&self, samples: &[f32], settings: &VoiceSettings) -> Result<String> {
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;

            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            if settings.lang.eq_ignore_ascii_case("auto") {
                params.set_language(None);
                params.set_detect_language(true);
            } else {
                params.set_language(Some(&settings.lang));
                params.set_detect_language(false);
            }
            params.set_temperature(settings.temperature);
            // Cap threads so a transcription pass doesn't starve the UI.
            params.set_n_threads(num_cpus::get().min(8) as i32);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            params.set_token_timestamps(false);

            state.full(params, samples)?;

            let segments = match state.full_n_segments() {
                Ok(count) if count >= 0 => count,
                Ok(_) => {
                    log_debug("whisper returned a negative segment count");
                    return Ok(String::new());
                }
                Err(err) => {
                    log_debug(&format!("whisper failed to read segment count: {err}"));
                    return Ok(String::new());
                }
            };

            let mut transcript = String::new();
            for i in 0..segments {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => transcript.push_str(&text),
                    Err(err) => log_debug(&format!("failed to read whisper segment {i}: {err}")),
                }
            }
            Ok(transcript.replace("[BLANK_AUDIO]", ""))
        }
    }

    /// Run `f` with stderr redirected to /dev/null, restoring it afterwards.
    fn with_stderr_silenced<T>(f: impl FnOnce() -> T) -> Result<T> {
        let null = std::fs::OpenOptions::new()
            .write(true)
            .open("/dev/null")
            .context("failed to open /dev/null")?;
        let null_fd = null.as_raw_fd();

        // SAFETY: dup/dup2 on stderr; the original descriptor is restored
        // and closed before returning on every path.
        let original = unsafe { libc::dup(2) };
        if original < 0 {
            return Err(anyhow!(
                "failed to dup stderr: {}",
                io::Error::last_os_error()
            ));
        }
        if unsafe { libc::dup2(null_fd, 2) } < 0 {
            unsafe { libc::close(original) };
            return Err(anyhow!(
                "failed to redirect stderr: {}",
                io::Error::last_os_error()
            ));
        }

        let result = f();

        let restored = unsafe { libc::dup2(original, 2) };
        unsafe { libc::close(original) };
        if restored < 0 {
            return Err(anyhow!(
                "failed to restore stderr: {}",
                io::Error::last_os_error()
            ));
        }
        Ok(result)
    }

    fn install_log_silencer() {
        static INSTALL: Once = Once::new();
        INSTALL.call_once(|| unsafe {
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
        // Drop whisper.cpp's default logger output on the floor; it would
        // land in the middle of the alternate screen.
    }
}

#[cfg(not(unix))]
mod platform {
    use crate::config::VoiceSettings;
    use anyhow::{anyhow, Result};

    /// Stub for unsupported targets.
    pub struct Transcriber;

    impl Transcriber {
        pub fn new(_: &str) -> Result<Self> {
            Err(anyhow!(
                "voice transcription is currently supported only on Unix-like platforms"
            ))
        }

        pub fn transcribe(&self, _: &[f32], _: &VoiceSettings) -> Result<String> {
            Err(anyhow!(
                "voice transcription is currently supported only on Unix-like platforms"
            ))
        }
    }
}

pub use platform::Transcriber;

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn transcriber_rejects_missing_model() {
        assert!(Transcriber::new("/no/such/model.bin").is_err());
    }
}
