use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::services::{check_status, http_client, JobStatus, Portrait, ServiceError, VideoService};

pub const DEFAULT_BASE_URL: &str = "https://mercury.dev.dream-ai.com/api";
pub const KEY_PREFIX: &str = "sk_hedra-";

const SERVICE: &str = "Hedra";

/// Hedra keys are issued with a fixed prefix; anything else is a config mistake.
pub fn is_valid_key(key: &str) -> bool {
    key.starts_with(KEY_PREFIX) && key.len() > KEY_PREFIX.len()
}

pub struct HedraClient {
    api_key: String,
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HedraClient {
    pub fn new(api_key: String, base_url: Option<String>) -> Result<Self, ServiceError> {
        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            api_key,
            base_url,
            client: http_client(SERVICE)?,
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn upload(&self, path: &str, part: Part) -> Result<String, ServiceError> {
        let url = self.url(path);
        debug!("POST {} (multipart)", url);
        let form = Form::new().part("file", part);
        let resp = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .multipart(form)
            .send()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        let resp = check_status(SERVICE, resp)?;

        let body: UploadResponse = resp
            .json()
            .map_err(|e| ServiceError::invalid(SERVICE, format!("{path}: {e}")))?;
        body.url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ServiceError::invalid(SERVICE, format!("{path} response missing url")))
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResponse {
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    status: Option<String>,
    video_url: Option<String>,
    error: Option<String>,
}

impl ProjectResponse {
    fn into_status(self) -> JobStatus {
        match self.status.as_deref() {
            Some("Completed") => JobStatus {
                state: super::JobState::Completed,
                video_url: self.video_url.filter(|u| !u.is_empty()),
                error: None,
            },
            Some("Failed") => JobStatus::failed(self.error),
            _ => JobStatus::pending(),
        }
    }
}

impl VideoService for HedraClient {
    fn name(&self) -> &str {
        SERVICE
    }

    fn upload_image(&self, portrait: &Portrait) -> Result<String, ServiceError> {
        let part = Part::bytes(portrait.bytes.clone())
            .file_name(portrait.file_name.clone())
            .mime_str(&portrait.content_type)
            .map_err(|e| ServiceError::invalid(SERVICE, e.to_string()))?;
        self.upload("/v1/portrait", part)
    }

    fn upload_audio(&self, audio: &[u8]) -> Result<String, ServiceError> {
        let part = Part::bytes(audio.to_vec())
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| ServiceError::invalid(SERVICE, e.to_string()))?;
        self.upload("/v1/audio", part)
    }

    fn submit_job(&self, image_url: &str, audio_url: &str) -> Result<String, ServiceError> {
        let url = self.url("/v1/characters");
        let body = serde_json::json!({
            "avatarImage": image_url,
            "audioSource": "audio",
            "voiceUrl": audio_url,
        });
        debug!("POST {}", url);
        let resp = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        let resp = check_status(SERVICE, resp)?;

        let body: JobResponse = resp
            .json()
            .map_err(|e| ServiceError::invalid(SERVICE, format!("characters: {e}")))?;
        Ok(body.job_id.unwrap_or_default())
    }

    fn get_status(&self, job_id: &str) -> Result<JobStatus, ServiceError> {
        let url = self.url(&format!("/v1/projects/{job_id}"));
        let resp = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        let resp = check_status(SERVICE, resp)?;

        let body: ProjectResponse = resp
            .json()
            .map_err(|e| ServiceError::invalid(SERVICE, format!("projects/{job_id}: {e}")))?;
        Ok(body.into_status())
    }

    fn fetch_result(&self, video_url: &str) -> Result<Vec<u8>, ServiceError> {
        let url = self.url(video_url);
        debug!("GET {}", url);
        let mut req = self.client.get(&url);
        // Result URLs are usually pre-signed storage links; only our own API wants the key.
        if url.starts_with(&self.base_url) {
            req = req.header("X-API-KEY", &self.api_key);
        }
        let resp = req.send().map_err(|e| ServiceError::transport(SERVICE, e))?;
        let resp = check_status(SERVICE, resp)?;

        let bytes = resp
            .bytes()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        if bytes.is_empty() {
            return Err(ServiceError::invalid(SERVICE, "empty video download"));
        }
        Ok(bytes.to_vec())
    }
}
