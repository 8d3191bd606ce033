//! Step status registry records
//!
//! One [`StepStatus`] per step identifier, owned by the executor for the
//! process lifetime. Once a status reaches `Complete` it is frozen: every
//! later poll observes the same record.

use gantry_api::{PollStepResponse, TypedOutput};
use serde_json::Value;
use std::collections::HashMap;

/// Exit code reported when a step failed without a runner exit record.
pub const FALLBACK_EXIT_CODE: i32 = 255;

/// Lifecycle state of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    NotStarted,
    Running,
    Complete,
}

/// Exit record from the runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitState {
    pub exit_code: i32,
    pub oom_killed: bool,
    pub exited: bool,
}

impl ExitState {
    pub fn success(&self) -> bool {
        self.exited && self.exit_code == 0 && !self.oom_killed
    }
}

/// Mutable per-step record, frozen at completion.
#[derive(Debug, Clone, Default)]
pub struct StepStatus {
    pub state: Option<StepState>,
    pub exit: Option<ExitState>,
    pub error: Option<String>,

    /// Exported environment propagated to later steps of the stage.
    pub envs: HashMap<String, String>,

    /// Captured plain output variables.
    pub outputs: HashMap<String, String>,

    /// Captured typed output variables.
    pub typed_outputs: Vec<TypedOutput>,

    /// Raw artifact bytes.
    pub artifact: Vec<u8>,

    pub optimization_state: String,
    pub telemetry: Option<Value>,

    /// Errors observed by the log pipeline, appended to the terminal error
    /// only when the step itself failed.
    pub log_errors: Vec<String>,

    /// The step was launched in the background and left running.
    pub detached: bool,
}

impl StepStatus {
    pub fn running() -> Self {
        StepStatus {
            state: Some(StepState::Running),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == Some(StepState::Complete)
    }

    /// Convert the terminal record to the boundary response.
    ///
    /// `exited` defaults to true; an exit record overrides it and appends
    /// `oom killed` or `exit status <n>` to the error chain. A step error
    /// with no exit record reports the fallback exit code 255.
    pub fn to_response(&self) -> PollStepResponse {
        let mut errors: Vec<String> = Vec::new();
        if let Some(err) = &self.error {
            errors.push(err.clone());
        }
        if self.exit.is_none() || !self.exit.map(|e| e.success()).unwrap_or(false) {
            errors.extend(self.log_errors.iter().cloned());
        }

        let mut exited = true;
        let mut exit_code = 0;
        let mut oom_killed = false;

        match self.exit {
            Some(exit) => {
                exited = exit.exited;
                exit_code = exit.exit_code;
                oom_killed = exit.oom_killed;
                if exit.oom_killed {
                    errors.push("oom killed".to_string());
                } else if exit.exit_code != 0 {
                    errors.push(format!("exit status {}", exit.exit_code));
                }
            }
            None => {
                if self.error.is_some() {
                    exit_code = FALLBACK_EXIT_CODE;
                }
            }
        }

        PollStepResponse {
            exited,
            exit_code,
            oom_killed,
            detached: self.detached,
            outputs: self.outputs.clone(),
            envs: self.envs.clone(),
            artifact: self.artifact.clone(),
            output_v2: self.typed_outputs.clone(),
            optimization_state: self.optimization_state.clone(),
            telemetry_data: self.telemetry.clone(),
            error: errors.join("; "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_exit_converts_to_empty_error() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 0,
                oom_killed: false,
                exited: true,
            }),
            ..Default::default()
        };
        let resp = status.to_response();
        assert!(resp.exited);
        assert_eq!(resp.exit_code, 0);
        assert!(resp.error.is_empty());
    }

    #[test]
    fn test_nonzero_exit_appends_exit_status() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 3,
                oom_killed: false,
                exited: true,
            }),
            ..Default::default()
        };
        assert_eq!(status.to_response().error, "exit status 3");
    }

    #[test]
    fn test_oom_appends_oom_killed() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 137,
                oom_killed: true,
                exited: true,
            }),
            ..Default::default()
        };
        let resp = status.to_response();
        assert!(resp.oom_killed);
        assert_eq!(resp.error, "oom killed");
    }

    #[test]
    fn test_error_without_exit_record_reports_255() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            error: Some("context deadline exceeded".to_string()),
            ..Default::default()
        };
        let resp = status.to_response();
        assert!(resp.exited, "exited defaults to true");
        assert_eq!(resp.exit_code, FALLBACK_EXIT_CODE);
        assert_eq!(resp.error, "context deadline exceeded");
    }

    #[test]
    fn test_log_errors_suppressed_on_success() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 0,
                oom_killed: false,
                exited: true,
            }),
            log_errors: vec!["flush failed".to_string()],
            ..Default::default()
        };
        assert!(status.to_response().error.is_empty());
    }

    #[test]
    fn test_log_errors_appended_on_failure() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 1,
                oom_killed: false,
                exited: true,
            }),
            log_errors: vec!["found possible error on line 3".to_string()],
            ..Default::default()
        };
        let err = status.to_response().error;
        assert!(err.contains("found possible error on line 3"));
        assert!(err.contains("exit status 1"));
    }

    #[test]
    fn test_detached_surfaces_as_first_class_field() {
        let status = StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 0,
                oom_killed: false,
                exited: false,
            }),
            detached: true,
            ..Default::default()
        };
        let resp = status.to_response();
        assert!(resp.detached);
        assert!(!resp.exited);
    }
}
