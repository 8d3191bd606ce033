//! Command execution seam
//!
//! The engine drives a single "run step" operation returning an exit record.
//! [`ProcessRunner`] is the host-process implementation over
//! `tokio::process`; containerized runners satisfy the same trait.

use crate::error::{EngineError, Result};
use crate::status::{ExitState, FALLBACK_EXIT_CODE};
use crate::tap::OutputTap;
use async_trait::async_trait;
use gantry_logstream::LiveLogWriter;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Synthesized description of the command a step runs.
#[derive(Debug, Clone, Default)]
pub struct ExecSpec {
    pub id: String,

    /// Interpreter invocation; empty means the platform default shell.
    pub entrypoint: Vec<String>,

    /// Script fragments joined into one script, passed to the interpreter.
    pub command: Vec<String>,

    pub working_dir: String,

    pub envs: HashMap<String, String>,
}

impl ExecSpec {
    /// The joined step script.
    pub fn script(&self) -> String {
        self.command.join("\n")
    }
}

/// Destinations for captured step output. Chunks are teed to the live log
/// writer and the in-memory tap, whichever are present.
#[derive(Clone, Default)]
pub struct OutputSinks {
    pub writer: Option<Arc<LiveLogWriter>>,
    pub tap: Option<Arc<OutputTap>>,
}

impl OutputSinks {
    pub async fn write(&self, chunk: &[u8]) {
        if let Some(writer) = &self.writer {
            writer.write(chunk);
        }
        if let Some(tap) = &self.tap {
            tap.write(chunk).await;
        }
    }
}

/// Executes one step command and reports its exit record.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &ExecSpec, sinks: &OutputSinks) -> Result<ExitState>;
}

/// Host-process runner over `tokio::process`.
///
/// The child is killed when the run future is dropped, which is how step
/// timeouts tear the process down.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        ProcessRunner
    }

    fn build_command(spec: &ExecSpec) -> Command {
        let script = spec.script();
        let (program, args): (String, Vec<String>) = if spec.entrypoint.is_empty() {
            ("sh".to_string(), vec!["-c".to_string(), script])
        } else {
            let mut args: Vec<String> = spec.entrypoint[1..].to_vec();
            args.push(script);
            (spec.entrypoint[0].clone(), args)
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&spec.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !spec.working_dir.is_empty() {
            cmd.current_dir(&spec.working_dir);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &ExecSpec, sinks: &OutputSinks) -> Result<ExitState> {
        let mut child = Self::build_command(spec)
            .spawn()
            .map_err(|e| EngineError::Runner(format!("spawn failed: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_sinks = sinks.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(mut stdout) = stdout {
                pump(&mut stdout, &stdout_sinks).await;
            }
        });
        let stderr_sinks = sinks.clone();
        let stderr_task = tokio::spawn(async move {
            if let Some(mut stderr) = stderr {
                pump(&mut stderr, &stderr_sinks).await;
            }
        });

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Runner(format!("wait failed: {e}")))?;

        // Drain the readers before reporting so output ordering holds.
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        let exit_code = status.code().unwrap_or(FALLBACK_EXIT_CODE);
        debug!(step_id = %spec.id, exit_code, "step process exited");

        Ok(ExitState {
            exit_code,
            oom_killed: false,
            exited: true,
        })
    }
}

async fn pump<R: AsyncReadExt + Unpin>(reader: &mut R, sinks: &OutputSinks) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sinks.write(&buf[..n]).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &[&str]) -> ExecSpec {
        ExecSpec {
            id: "test-step".to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_zero_exit_on_success() {
        let runner = ProcessRunner::new();
        let exit = runner.run(&spec(&["true"]), &OutputSinks::default()).await.unwrap();
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let runner = ProcessRunner::new();
        let exit = runner.run(&spec(&["exit 3"]), &OutputSinks::default()).await.unwrap();
        assert_eq!(exit.exit_code, 3);
        assert!(exit.exited);
    }

    #[tokio::test]
    async fn test_stdout_reaches_tap() {
        let runner = ProcessRunner::new();
        let tap = OutputTap::new();
        let sinks = OutputSinks {
            writer: None,
            tap: Some(Arc::clone(&tap)),
        };
        runner.run(&spec(&["printf 'captured'"]), &sinks).await.unwrap();
        let (bytes, _, _rx) = tap.subscribe(0).await.unwrap();
        assert_eq!(bytes, b"captured");
    }

    #[tokio::test]
    async fn test_multiline_command_joins_as_script() {
        let s = spec(&["A=1", "printf \"$A\""]);
        assert_eq!(s.script(), "A=1\nprintf \"$A\"");
        let runner = ProcessRunner::new();
        let tap = OutputTap::new();
        let sinks = OutputSinks {
            writer: None,
            tap: Some(Arc::clone(&tap)),
        };
        runner.run(&s, &sinks).await.unwrap();
        let (bytes, _, _rx) = tap.subscribe(0).await.unwrap();
        assert_eq!(bytes, b"1");
    }

    #[tokio::test]
    async fn test_env_vars_visible_to_command() {
        let mut s = spec(&["printf \"$GANTRY_TEST_VAR\""]);
        s.envs.insert("GANTRY_TEST_VAR".to_string(), "v1".to_string());
        let runner = ProcessRunner::new();
        let tap = OutputTap::new();
        let sinks = OutputSinks {
            writer: None,
            tap: Some(Arc::clone(&tap)),
        };
        runner.run(&s, &sinks).await.unwrap();
        let (bytes, _, _rx) = tap.subscribe(0).await.unwrap();
        assert_eq!(bytes, b"v1");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_runner_error() {
        let mut s = spec(&["whatever"]);
        s.entrypoint = vec!["/nonexistent/interpreter".to_string()];
        let runner = ProcessRunner::new();
        let err = runner.run(&s, &OutputSinks::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Runner(_)));
    }
}
