//! Minimal Gemini generative-language API client.
//!
//! This crate provides a focused client for the `generateContent` endpoint:
//! - Single-turn text prompts
//! - Optional generation config (temperature, output token cap)
//! - Extraction of the first candidate's text

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Errors that can occur when using the Gemini client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Response contained no candidate text")]
    EmptyResponse,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Gemini API client.
#[derive(Clone)]
pub struct Gemini {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl std::fmt::Debug for Gemini {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gemini")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Gemini {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Create a client from the GEMINI_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| Error::NoApiKey)?;
        if api_key.trim().is_empty() {
            return Err(Error::NoApiKey);
        }
        Self::new(api_key)
    }

    /// Set the default model for this client.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point the client at a different API base (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a request and return the full response.
    pub async fn complete(&self, request: Request) -> Result<Response, Error> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let api_request = build_api_request(&request);

        tracing::debug!(model = %model, prompt_len = request.prompt.len(), "generateContent");

        let response = self
            .client
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .headers(build_headers())
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status, "Gemini API returned an error");
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        parse_response(api_response)
    }

    /// Send a single prompt and return the first candidate's text.
    pub async fn generate(&self, prompt: impl Into<String>) -> Result<String, Error> {
        let response = self.complete(Request::new(prompt)).await?;
        Ok(response.text)
    }
}

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn build_api_request(request: &Request) -> ApiRequest {
    let generation_config = if request.temperature.is_some() || request.max_output_tokens.is_some()
    {
        Some(ApiGenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        })
    } else {
        None
    };

    ApiRequest {
        contents: vec![ApiContent {
            parts: vec![ApiPart {
                text: request.prompt.clone(),
            }],
        }],
        generation_config,
    }
}

fn parse_response(api_response: ApiResponse) -> Result<Response, Error> {
    let candidate = api_response
        .candidates
        .into_iter()
        .next()
        .ok_or(Error::EmptyResponse)?;

    let text = candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .map(|part| part.text)
        .ok_or(Error::EmptyResponse)?;

    Ok(Response {
        text,
        finish_reason: candidate.finish_reason,
    })
}

// ============================================================================
// Public types
// ============================================================================

/// A generation request.
#[derive(Debug, Clone)]
pub struct Request {
    pub model: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<usize>,
}

impl Request {
    /// Create a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            prompt: prompt.into(),
            temperature: None,
            max_output_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// A generation response.
#[derive(Debug, Clone)]
pub struct Response {
    /// Text of the first part of the first candidate.
    pub text: String,
    pub finish_reason: Option<String>,
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = Gemini::new("test-key").unwrap();
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.base_url, DEFAULT_API_BASE);
    }

    #[test]
    fn test_client_with_model_and_base() {
        let client = Gemini::new("test-key")
            .unwrap()
            .with_model("gemini-1.5-pro")
            .with_base_url("http://localhost:8080/");
        assert_eq!(client.model(), "gemini-1.5-pro");
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = Gemini::new("secret-key").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_request_body_shape() {
        let request = Request::new("Hello");
        let body = serde_json::to_value(build_api_request(&request)).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Hello");
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn test_request_generation_config() {
        let request = Request::new("Hello")
            .with_temperature(0.2)
            .with_max_output_tokens(512);
        let body = serde_json::to_value(build_api_request(&request)).unwrap();
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
        assert!(body["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn test_parse_first_candidate() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "first"}, {"text": "second"}], "role": "model"},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "other"}]}}
            ]
        }"#;
        let api: ApiResponse = serde_json::from_str(raw).unwrap();
        let response = parse_response(api).unwrap();
        assert_eq!(response.text, "first");
        assert_eq!(response.finish_reason.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_parse_empty_candidates() {
        let api: ApiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(matches!(parse_response(api), Err(Error::EmptyResponse)));

        let api: ApiResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert!(matches!(parse_response(api), Err(Error::EmptyResponse)));
    }
}
