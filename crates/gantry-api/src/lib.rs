//! Gantry API - boundary types for the step-execution engine
//!
//! Wire-level request/response schemas exchanged with callers and the log
//! service. Field names on the log-service line schema are externally fixed;
//! everything else serializes as snake_case JSON.

pub mod config;
pub mod envvars;
pub mod error;
pub mod line;
pub mod setup;
pub mod step;

pub use config::{LogConfig, TiConfig};
pub use error::{ApiError, Result};
pub use line::RemoteLine;
pub use setup::SetupRequest;
pub use step::{
    OutputKind, PollStepRequest, PollStepResponse, RunSpec, RunTestsSpec, RunTestsV2Spec,
    StartStepRequest, StepKind, StreamOutputRequest, TestReport, TypedOutput,
};

/// Gantry API version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
