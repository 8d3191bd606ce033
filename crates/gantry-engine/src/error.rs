//! Error types for step execution

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("id needs to be set")]
    MissingId,

    #[error("step {0} not started")]
    NotStarted(String),

    /// Wall-clock budget expired. The message is part of the external
    /// contract; callers match on it.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("offset {offset} out of bounds for output of {len} bytes")]
    OffsetOutOfBounds { offset: usize, len: usize },

    #[error("output variable length is more than {0} bytes")]
    OutputTooLong(usize),

    #[error("failed to run step: {0}")]
    Runner(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("collection failed: {0}")]
    Collection(String),

    #[error(transparent)]
    Api(#[from] gantry_api::ApiError),

    #[error(transparent)]
    LogStream(#[from] gantry_logstream::LogStreamError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Masker(#[from] gantry_masker::MaskerError),
}

/// Result type for step execution
pub type Result<T> = std::result::Result<T, EngineError>;
