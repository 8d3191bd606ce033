//! In-memory fakes for the runner seam (testing only)
//!
//! `ScriptedRunner` satisfies [`CommandRunner`] without spawning anything:
//! it records every spec it is handed, optionally emits canned output and
//! sleeps, then returns a configured exit record or error.

use crate::error::{EngineError, Result};
use crate::runner::{CommandRunner, ExecSpec, OutputSinks};
use crate::status::ExitState;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Outcome {
    Exit(ExitState),
    Error(String),
}

/// Scripted stand-in for a real command runner.
#[derive(Debug)]
pub struct ScriptedRunner {
    specs: Mutex<Vec<ExecSpec>>,
    output: Vec<u8>,
    delay: Duration,
    outcome: Outcome,
}

impl ScriptedRunner {
    /// Runner that immediately exits 0.
    pub fn succeeding() -> Self {
        Self::exiting(0)
    }

    /// Runner that immediately exits with `code`.
    pub fn exiting(code: i32) -> Self {
        ScriptedRunner {
            specs: Mutex::new(Vec::new()),
            output: Vec::new(),
            delay: Duration::ZERO,
            outcome: Outcome::Exit(ExitState {
                exit_code: code,
                oom_killed: false,
                exited: true,
            }),
        }
    }

    /// Runner whose run fails before producing an exit record.
    pub fn failing(message: &str) -> Self {
        ScriptedRunner {
            specs: Mutex::new(Vec::new()),
            output: Vec::new(),
            delay: Duration::ZERO,
            outcome: Outcome::Error(message.to_string()),
        }
    }

    /// Emit `output` into the sinks before exiting.
    pub fn with_output(mut self, output: &[u8]) -> Self {
        self.output = output.to_vec();
        self
    }

    /// Sleep before exiting; pairs with step timeouts in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every spec this runner was handed, in order.
    pub fn specs(&self) -> Vec<ExecSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Number of runs performed.
    pub fn run_count(&self) -> usize {
        self.specs.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &ExecSpec, sinks: &OutputSinks) -> Result<ExitState> {
        self.specs.lock().unwrap().push(spec.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if !self.output.is_empty() {
            sinks.write(&self.output).await;
        }
        match &self.outcome {
            Outcome::Exit(exit) => Ok(*exit),
            Outcome::Error(message) => Err(EngineError::Runner(message.clone())),
        }
    }
}
