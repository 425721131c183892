//! Error types for story operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors from version-store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Version not found: {0}")]
    NotFound(Uuid),

    #[error("The root version cannot be renamed or deleted")]
    RootVersion,

    #[error("Version index {index} out of range (have {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("Parent version {0} does not exist")]
    MissingParent(Uuid),
}

/// Errors from editor handlers.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Generative API error: {0}")]
    Api(#[from] gemini::Error),

    #[error("Speech engine error: {0}")]
    Speech(#[from] speech::Error),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Could not parse model reply: {0}")]
    Parse(String),

    #[error("Text too short to analyze ({len} < {min} characters)")]
    TextTooShort { len: usize, min: usize },

    #[error("No story versions yet")]
    NoVersions,

    #[error("No valid text selection")]
    InvalidSelection,

    #[error("A newer request superseded this one")]
    Stale,
}

impl StoryError {
    /// Whether the error came from an external service.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            StoryError::Api(gemini::Error::Network(_))
                | StoryError::Api(gemini::Error::Api { .. })
                | StoryError::Speech(speech::Error::Network(_))
                | StoryError::Speech(speech::Error::Api { .. })
        )
    }
}
