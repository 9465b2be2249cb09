//! Error types for Chatscribe.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A single surface element could not be read. Recovered by skipping it.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Navigation or connection failure. Fatal to the affected target only.
    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a record stream may skip the failing element and keep polling.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Extraction(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
