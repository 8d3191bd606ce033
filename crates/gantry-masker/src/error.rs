//! Error types for masking rule construction

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskerError {
    #[error("invalid base64 pattern payload: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    #[error("pattern payload is not UTF-8: {0}")]
    NotUtf8(#[from] std::string::FromUtf8Error),

    #[error("failed to read pattern file: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for masking rule construction
pub type Result<T> = std::result::Result<T, MaskerError>;
