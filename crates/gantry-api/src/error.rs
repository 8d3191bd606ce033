//! Error types for boundary request validation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("id needs to be set")]
    MissingId,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for boundary validation
pub type Result<T> = std::result::Result<T, ApiError>;
