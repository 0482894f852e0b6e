use serde::Deserialize;
use tracing::debug;

use crate::media::audio::pcm16_to_wav;
use crate::services::{check_status, http_client, ServiceError, SpeechService, Voice};

pub const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

const SERVICE: &str = "ElevenLabs";

/// Sample rates the `pcm_*` output formats support.
const PCM_RATES: &[u32] = &[16000, 22050, 24000, 44100];

pub struct ElevenLabsClient {
    api_key: String,
    base_url: String,
    model_id: String,
    sample_rate: u32,
    client: reqwest::blocking::Client,
}

impl ElevenLabsClient {
    pub fn new(api_key: String) -> Result<Self, ServiceError> {
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            client: http_client(SERVICE)?,
        })
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn with_model(mut self, model_id: Option<String>) -> Self {
        if let Some(model) = model_id {
            self.model_id = model;
        }
        self
    }

    /// Unsupported rates fall back to the default.
    pub fn with_sample_rate(mut self, sample_rate: Option<u32>) -> Self {
        if let Some(rate) = sample_rate {
            self.sample_rate = if PCM_RATES.contains(&rate) {
                rate
            } else {
                DEFAULT_SAMPLE_RATE
            };
        }
        self
    }
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<Voice>,
}

impl SpeechService for ElevenLabsClient {
    fn name(&self) -> &str {
        SERVICE
    }

    fn list_voices(&self) -> Result<Vec<Voice>, ServiceError> {
        let url = format!("{}/voices", self.base_url);
        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        let resp = check_status(SERVICE, resp)?;

        let body: VoicesResponse = resp
            .json()
            .map_err(|e| ServiceError::invalid(SERVICE, format!("voices: {e}")))?;
        Ok(body.voices)
    }

    fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        language: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        let url = format!(
            "{}/text-to-speech/{}?output_format=pcm_{}",
            self.base_url, voice_id, self.sample_rate
        );
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
            "language_code": language,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            },
        });

        debug!(voice_id, language, chars = text.len(), "POST text-to-speech");
        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        let resp = check_status(SERVICE, resp)?;

        let pcm = resp
            .bytes()
            .map_err(|e| ServiceError::transport(SERVICE, e))?;
        if pcm.is_empty() {
            return Err(ServiceError::invalid(SERVICE, "empty audio response"));
        }

        // pcm_* formats are headerless 16-bit little-endian mono.
        pcm16_to_wav(&pcm, self.sample_rate, 1)
            .map_err(|e| ServiceError::invalid(SERVICE, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_trims_base_url_and_clamps_rate() {
        let client = ElevenLabsClient::new("k".into())
            .unwrap()
            .with_base_url(Some("http://localhost:9000/v1/".into()))
            .with_sample_rate(Some(48000));
        assert_eq!(client.base_url, "http://localhost:9000/v1");
        assert_eq!(client.sample_rate, DEFAULT_SAMPLE_RATE);

        let client = ElevenLabsClient::new("k".into())
            .unwrap()
            .with_sample_rate(Some(44100));
        assert_eq!(client.sample_rate, 44100);
    }

    #[test]
    fn voices_response_deserializes() {
        let json = r#"{"voices":[{"voice_id":"abc","name":"Rachel","category":"premade","labels":{}}]}"#;
        let parsed: VoicesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.voices[0].voice_id, "abc");
        assert_eq!(parsed.voices[0].category.as_deref(), Some("premade"));
    }
}
