//! Thin REST clients for the service's account and medical-profile
//! endpoints. These are external collaborators consumed opaquely: small
//! request/response types, one method per route, no retry logic.

pub mod geo;
pub mod session;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failures from the account/profile endpoints. `Rejected` carries the
/// server's own message so the UI can show it verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Rejected { status: u16, message: String },
}

/// Free-text medical profile fields, exactly as the service stores them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalProfile {
    #[serde(default)]
    pub allergies: String,
    #[serde(default)]
    pub conditions: String,
    #[serde(default)]
    pub blood_type: String,
    #[serde(default)]
    pub medications: String,
}

/// Body for `POST /api/signup`; the initial profile fields are optional on
/// the wire and default to empty.
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: MedicalProfile,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    user_id: serde_json::Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct ProfileUpdate<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    profile: &'a MedicalProfile,
}

/// Blocking client for the account and profile routes.
pub struct ApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Exchange credentials for the opaque user identifier.
    pub fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .post(format!("{}/api/login", self.base_url))
            .json(&Credentials { username, password })
            .send()?;
        let response = reject_on_error(response)?;
        let body: LoginResponse = response.json()?;
        Ok(opaque_id(&body.user_id))
    }

    pub fn signup(&self, request: &SignupRequest) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/api/signup", self.base_url))
            .json(request)
            .send()?;
        reject_on_error(response)?;
        Ok(())
    }

    pub fn medical_history(&self, user_id: &str) -> Result<MedicalProfile, ApiError> {
        let response = self
            .http
            .get(format!("{}/api/medical-history", self.base_url))
            .query(&[("user_id", user_id)])
            .send()?;
        let response = reject_on_error(response)?;
        Ok(response.json()?)
    }

    pub fn update_medical_history(
        &self,
        user_id: &str,
        profile: &MedicalProfile,
    ) -> Result<(), ApiError> {
        let response = self
            .http
            .post(format!("{}/api/medical-history", self.base_url))
            .json(&ProfileUpdate { user_id, profile })
            .send()?;
        reject_on_error(response)?;
        Ok(())
    }
}

/// The service sends numeric ids today; treat whatever arrives as opaque
/// text.
fn opaque_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn reject_on_error(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .map(|body| body.error)
        .unwrap_or_else(|_| format!("server returned status {status}"));
    Err(ApiError::Rejected {
        status: status.as_u16(),
        message,
    })
}
