pub mod elevenlabs;
pub mod hedra;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A voice offered by the speech service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Still image used as the talking head for one character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Portrait {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl Portrait {
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self {
            bytes,
            file_name,
            content_type,
        }
    }

    /// Read a portrait from disk, guessing the content type from its extension.
    pub fn load(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("portrait.png")
            .to_string();
        Ok(Self::new(bytes, file_name))
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    let ext = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Completed,
    Failed,
}

/// Status of a video job as reported by the video service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            video_url: None,
            error: None,
        }
    }

    pub fn completed(video_url: impl Into<String>) -> Self {
        Self {
            state: JobState::Completed,
            video_url: Some(video_url.into()),
            error: None,
        }
    }

    pub fn failed(error: Option<String>) -> Self {
        Self {
            state: JobState::Failed,
            video_url: None,
            error,
        }
    }
}

/// Per-request ceiling. Uploads and video downloads run far past reqwest's
/// 30 second default.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub(crate) fn http_client(service: &'static str) -> Result<reqwest::blocking::Client, ServiceError> {
    reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ServiceError::transport(service, e))
}

/// Failure talking to an external service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{service}: authentication failed (HTTP {status}); check the API key")]
    Auth { service: &'static str, status: u16 },

    #[error("{service}: network error: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service}: unexpected response: {detail}")]
    InvalidResponse {
        service: &'static str,
        detail: String,
    },
}

impl ServiceError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ServiceError::Auth { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ServiceError::Transport { .. })
    }

    pub(crate) fn transport(service: &'static str, err: reqwest::Error) -> Self {
        ServiceError::Transport {
            service,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid(service: &'static str, detail: impl Into<String>) -> Self {
        ServiceError::InvalidResponse {
            service,
            detail: detail.into(),
        }
    }
}

/// Text-to-speech backend.
pub trait SpeechService {
    /// Service name used in logs and error messages.
    fn name(&self) -> &str;

    fn list_voices(&self) -> Result<Vec<Voice>, ServiceError>;

    /// Synthesize `text` and return a WAV byte stream.
    fn synthesize(&self, text: &str, voice_id: &str, language: &str)
        -> Result<Vec<u8>, ServiceError>;
}

/// Talking-head video backend with an asynchronous job API.
pub trait VideoService {
    fn name(&self) -> &str;

    fn upload_image(&self, portrait: &Portrait) -> Result<String, ServiceError>;

    fn upload_audio(&self, audio: &[u8]) -> Result<String, ServiceError>;

    /// Submit a generation job. An empty string means the service gave no job id.
    fn submit_job(&self, image_url: &str, audio_url: &str) -> Result<String, ServiceError>;

    fn get_status(&self, job_id: &str) -> Result<JobStatus, ServiceError>;

    fn fetch_result(&self, video_url: &str) -> Result<Vec<u8>, ServiceError>;
}

/// Turn a non-success HTTP response into a `ServiceError`.
pub(crate) fn check_status(
    service: &'static str,
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ServiceError::Auth {
            service,
            status: status.as_u16(),
        });
    }
    let body = resp.text().unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_outlasts_the_default_timeout() {
        assert!(REQUEST_TIMEOUT > Duration::from_secs(30));
        assert!(http_client("test").is_ok());
    }

    #[test]
    fn portrait_content_type_from_extension() {
        assert_eq!(Portrait::new(vec![], "a.JPG").content_type, "image/jpeg");
        assert_eq!(Portrait::new(vec![], "b.webp").content_type, "image/webp");
        assert_eq!(Portrait::new(vec![], "noext").content_type, "image/png");
    }

    #[test]
    fn service_error_classification() {
        let auth = ServiceError::Auth {
            service: "speech",
            status: 401,
        };
        assert!(auth.is_auth());
        assert!(!auth.is_transport());
        assert!(auth.to_string().contains("API key"));

        let net = ServiceError::Transport {
            service: "video",
            message: "connection reset".into(),
        };
        assert!(net.is_transport());
    }
}
