//! Editor configuration.

use thiserror::Error;

/// Default minimum story length (in characters) before analysis runs.
pub const DEFAULT_MIN_ANALYSIS_CHARS: usize = 50;

/// Default characters of context sent on each side of a selection.
pub const DEFAULT_CONTEXT_WINDOW: usize = 4000;

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Configuration for a story editing session.
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Generative API key. Required to build the real clients.
    pub api_key: Option<String>,

    /// Model to use (defaults to the client's default).
    pub model: Option<String>,

    /// Override for the generative API base URL.
    pub api_base: Option<String>,

    /// Temperature for generation.
    pub temperature: Option<f32>,

    /// Base URL of the speech-synthesis engine.
    pub speech_base_url: String,

    /// Speaker (style) id for synthesis.
    pub speaker: u32,

    /// Text shorter than this is never analyzed.
    pub min_analysis_chars: usize,

    /// Characters of preceding/following context for continuations.
    pub context_window: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            api_base: None,
            temperature: None,
            speech_base_url: speech::DEFAULT_BASE_URL.to_string(),
            speaker: 1,
            min_analysis_chars: DEFAULT_MIN_ANALYSIS_CHARS,
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl EditorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration from the environment.
    ///
    /// `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_API_BASE`, `SPEECH_BASE_URL`,
    /// `SPEECH_SPEAKER`, `STORY_MIN_ANALYSIS_CHARS`. Unset variables keep
    /// their defaults; malformed numbers are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.api_key = env_string("GEMINI_API_KEY");
        config.model = env_string("GEMINI_MODEL");
        config.api_base = env_string("GEMINI_API_BASE");
        if let Some(url) = env_string("SPEECH_BASE_URL") {
            config.speech_base_url = url;
        }
        if let Some(speaker) = env_parse("SPEECH_SPEAKER")? {
            config.speaker = speaker;
        }
        if let Some(min) = env_parse("STORY_MIN_ANALYSIS_CHARS")? {
            config.min_analysis_chars = min;
        }

        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_speech_base_url(mut self, url: impl Into<String>) -> Self {
        self.speech_base_url = url.into();
        self
    }

    pub fn with_speaker(mut self, speaker: u32) -> Self {
        self.speaker = speaker;
        self
    }

    pub fn with_min_analysis_chars(mut self, min: usize) -> Self {
        self.min_analysis_chars = min;
        self
    }

    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.context_window = chars;
        self
    }
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env_string(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(None),
    }
}
