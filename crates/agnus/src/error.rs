// crates/agnus/src/error.rs
// Standardized error types for the review core

use thiserror::Error;

/// Main error type for the agnus library
#[derive(Error, Debug)]
pub enum AgnusError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("VCS error: {0}")]
    Vcs(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using AgnusError
pub type Result<T> = std::result::Result<T, AgnusError>;

impl From<String> for AgnusError {
    fn from(s: String) -> Self {
        AgnusError::Other(s)
    }
}

impl From<tokio::task::JoinError> for AgnusError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            AgnusError::Cancelled
        } else {
            AgnusError::Other(err.to_string())
        }
    }
}

impl From<AgnusError> for String {
    fn from(err: AgnusError) -> Self {
        err.to_string()
    }
}
