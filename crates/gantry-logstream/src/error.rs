//! Error types for the log pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogStreamError {
    #[error("log service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("stream {0} is not open")]
    NotOpen(String),

    #[error("invalid client tls material: {0}")]
    Tls(String),

    #[error("retry budget of {0:?} exhausted: {1}")]
    BudgetExhausted(std::time::Duration, String),

    #[error("operation canceled")]
    Canceled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LogStreamError {
    /// Whether a retrying caller should attempt again: transport failures
    /// and 5xx responses are transient, everything else is terminal.
    pub fn is_retriable(&self) -> bool {
        match self {
            LogStreamError::Transport(_) => true,
            LogStreamError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for log pipeline operations
pub type Result<T> = std::result::Result<T, LogStreamError>;
