//! Client for a local speech-synthesis engine.
//!
//! Speaks the three-step protocol used by VOICEVOX-compatible engines:
//! - `GET /speakers` lists voices and their styles
//! - `POST /audio_query?text=&speaker=` builds a synthesis query
//! - `POST /synthesis?speaker=` renders that query to WAV bytes

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:50021";

/// Errors that can occur when talking to the speech engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Speech engine error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),
}

/// A voice offered by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    #[serde(default)]
    pub speaker_uuid: String,
    #[serde(default)]
    pub styles: Vec<SpeakerStyle>,
}

/// One style of a voice. `id` is what the engine calls the speaker number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerStyle {
    pub name: String,
    pub id: u32,
}

/// Opaque synthesis query returned by `audio_query`.
///
/// The engine owns the schema; only a few tuning knobs are exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioQuery(pub serde_json::Value);

impl AudioQuery {
    pub fn speed_scale(&self) -> Option<f64> {
        self.0.get("speedScale").and_then(|v| v.as_f64())
    }

    pub fn set_speed_scale(&mut self, scale: f64) {
        if let Some(obj) = self.0.as_object_mut() {
            obj.insert("speedScale".to_string(), serde_json::json!(scale));
        }
    }

    pub fn output_sampling_rate(&self) -> Option<u64> {
        self.0.get("outputSamplingRate").and_then(|v| v.as_u64())
    }
}

/// Speech engine client.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    client: reqwest::Client,
    base_url: String,
}

impl SpeechClient {
    /// Create a client for the engine at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a client from SPEECH_BASE_URL, falling back to the local default.
    pub fn from_env() -> Result<Self, Error> {
        let base =
            std::env::var("SPEECH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the available voices.
    pub async fn speakers(&self) -> Result<Vec<Speaker>, Error> {
        let response = self
            .client
            .get(self.url("speakers"))
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Build a synthesis query for `text` spoken by `speaker`.
    pub async fn audio_query(&self, text: &str, speaker: u32) -> Result<AudioQuery, Error> {
        tracing::debug!(speaker, text_len = text.len(), "audio_query");

        let response = self
            .client
            .post(self.url("audio_query"))
            .query(&[("text", text.to_string()), ("speaker", speaker.to_string())])
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    /// Render a query to audio bytes (WAV).
    pub async fn synthesis(&self, query: &AudioQuery, speaker: u32) -> Result<Vec<u8>, Error> {
        tracing::debug!(speaker, "synthesis");

        let response = self
            .client
            .post(self.url("synthesis"))
            .query(&[("speaker", speaker.to_string())])
            .json(query)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Query and synthesize in one go.
    pub async fn speak(&self, text: &str, speaker: u32) -> Result<Vec<u8>, Error> {
        let query = self.audio_query(text, speaker).await?;
        self.synthesis(&query, speaker).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    tracing::warn!(status, "speech engine returned an error");
    Err(Error::Api { status, message })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let client = SpeechClient::new("http://localhost:50021/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:50021");
        assert_eq!(client.url("speakers"), "http://localhost:50021/speakers");
    }

    #[test]
    fn test_parse_speakers() {
        let raw = r#"[
            {"name": "Metan", "speaker_uuid": "7ffcb7ce", "styles": [
                {"name": "Normal", "id": 2}, {"name": "Sweet", "id": 0}
            ], "version": "0.14.0"}
        ]"#;
        let speakers: Vec<Speaker> = serde_json::from_str(raw).unwrap();
        assert_eq!(speakers.len(), 1);
        assert_eq!(speakers[0].styles[1].id, 0);
    }

    #[test]
    fn test_audio_query_knobs() {
        let mut query = AudioQuery(serde_json::json!({
            "accent_phrases": [],
            "speedScale": 1.0,
            "outputSamplingRate": 24000
        }));
        assert_eq!(query.speed_scale(), Some(1.0));
        query.set_speed_scale(1.25);
        assert_eq!(query.speed_scale(), Some(1.25));
        assert_eq!(query.output_sampling_rate(), Some(24000));

        // Serializes back to the engine's own shape
        let body = serde_json::to_value(&query).unwrap();
        assert!(body.get("accent_phrases").is_some());
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_network_error() {
        let client = SpeechClient::new("http://127.0.0.1:9").unwrap();
        let result = client.speakers().await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
