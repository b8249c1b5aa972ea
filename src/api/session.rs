//! Persisted user session.
//!
//! The signed-in identifier is an explicit value owned by the application
//! state — login and logout are the only writers — and survives restarts in
//! a small YAML file. Nothing else reads or writes that file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: Option<String>,
}

impl UserSession {
    /// Load from `path`; a missing or unreadable file is a signed-out
    /// session, not an error.
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_yaml::from_str(&raw) {
            Ok(session) => session,
            Err(err) => {
                crate::log_debug(&format!("session file unreadable, starting signed out: {err}"));
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create session dir {parent:?}"))?;
        }
        let raw = serde_yaml::to_string(self).context("failed to serialize session")?;
        fs::write(path, raw).with_context(|| format!("failed to write session file {path:?}"))
    }

    pub fn sign_in(&mut self, user_id: String) {
        self.user_id = Some(user_id);
    }

    pub fn sign_out(&mut self) {
        self.user_id = None;
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }
}
