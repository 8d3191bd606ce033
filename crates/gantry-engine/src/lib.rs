//! Gantry Engine - step execution on an ephemeral compute node
//!
//! The core scheduler: accepts start/poll/stream requests for pipeline
//! steps, runs each step's command behind the [`runner::CommandRunner`]
//! seam, tees output into the masked live log pipeline and the in-memory
//! tap, collects exchange files after the run, and surfaces frozen terminal
//! statuses to every waiter.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod fakes;
pub mod runner;
pub mod setup;
pub mod state;
pub mod status;
pub mod tap;

pub use dispatch::collect::{CollectorOutput, PostRunCollector};
pub use error::{EngineError, Result};
pub use executor::StepExecutor;
pub use runner::{CommandRunner, ExecSpec, OutputSinks, ProcessRunner};
pub use setup::apply_setup;
pub use state::{PipelineContext, PipelineContextBuilder, StageEnv};
pub use status::{ExitState, StepState, StepStatus};
pub use tap::OutputTap;

/// Gantry engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
