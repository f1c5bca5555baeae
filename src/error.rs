//! Error types for Wiseone.

use thiserror::Error;

/// Library-level error type for Wiseone operations.
#[derive(Error, Debug)]
pub enum WiseoneError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("Generation failed during {stage}: {message}")]
    Generation { stage: String, message: String },

    #[error("Ingestion of '{filename}' failed: {message}")]
    Ingestion { filename: String, message: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Could not complete this turn: {0}")]
    Turn(Box<WiseoneError>),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl WiseoneError {
    /// Build a generation error tagged with the pipeline stage that raised it.
    pub fn generation(stage: &str, message: impl Into<String>) -> Self {
        WiseoneError::Generation {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Build a per-document ingestion error.
    pub fn ingestion(filename: &str, message: impl Into<String>) -> Self {
        WiseoneError::Ingestion {
            filename: filename.to_string(),
            message: message.into(),
        }
    }

    /// Whether repeating the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            WiseoneError::Embedding(_)
            | WiseoneError::Retrieval(_)
            | WiseoneError::Generation { .. }
            | WiseoneError::Timeout(_)
            | WiseoneError::Http(_) => true,
            WiseoneError::Turn(inner) => inner.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for Wiseone operations.
pub type Result<T> = std::result::Result<T, WiseoneError>;
