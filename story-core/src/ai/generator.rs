//! The seam between story logic and the generative-text service.

use async_trait::async_trait;
use gemini::{Gemini, Request};

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, gemini::Error>;
}

/// Gemini-backed generator with per-request settings.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: Gemini,
    temperature: Option<f32>,
}

impl GeminiGenerator {
    pub fn new(client: Gemini) -> Self {
        Self {
            client,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, gemini::Error> {
        let mut request = Request::new(prompt);
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }
        Ok(self.client.complete(request).await?.text)
    }
}
