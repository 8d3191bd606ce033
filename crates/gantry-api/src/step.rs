//! Step lifecycle request/response schemas
//!
//! A caller drives one step through `start_step` / `poll_step` /
//! `stream_output`. Requests are immutable descriptions; the poll response is
//! the frozen terminal record.

use crate::config::{LogConfig, TiConfig};
use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What flavor of work the step performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Plain command execution.
    #[default]
    Run,
    /// Test execution with TI-driven test selection.
    RunTests,
    /// Test execution with agent-injected instrumentation.
    RunTestsV2,
}

/// Command payload for a plain run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    /// Shell fragments joined into the step script.
    #[serde(default)]
    pub command: Vec<String>,

    /// Interpreter invocation, e.g. `["sh", "-c"]` or `["powershell"]`.
    /// The first element selects the output-capture dialect.
    #[serde(default)]
    pub entrypoint: Vec<String>,
}

/// Command payload for TI-selected test runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTestsSpec {
    /// User arguments for the test tool.
    #[serde(default)]
    pub args: String,

    /// Source language, e.g. `java`, `python`.
    #[serde(default)]
    pub language: String,

    /// Build tool, e.g. `maven`, `bazel`.
    #[serde(default)]
    pub build_tool: String,

    /// Package globs instrumented for the callgraph.
    #[serde(default)]
    pub packages: String,

    /// Run only the TI-selected subset instead of the full suite.
    #[serde(default)]
    pub run_only_selected_tests: bool,

    /// Script run before the tests.
    #[serde(default)]
    pub pre_command: String,

    /// Script run after the tests.
    #[serde(default)]
    pub post_command: String,
}

/// Command payload for instrumented (v2) test runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTestsV2Spec {
    /// Shell fragments joined into the step script.
    #[serde(default)]
    pub command: Vec<String>,

    /// Interpreter invocation; first element selects the capture dialect.
    #[serde(default)]
    pub entrypoint: Vec<String>,

    /// Directories whose contents the test agent intercepts.
    #[serde(default)]
    pub test_globs: Vec<String>,
}

/// Descriptor for post-run test-report ingestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Report format; only `junit` is recognized today.
    #[serde(default)]
    pub kind: String,

    /// Globs of report files relative to the working directory.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Declared type of a typed output variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    String,
    Secret,
}

/// A typed output variable. In requests `value` is empty; responses carry
/// the captured value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypedOutput {
    pub key: String,

    #[serde(default)]
    pub value: String,

    #[serde(rename = "type", default)]
    pub kind: OutputKind,
}

/// Explicit override paths for the step exchange files. When set, the
/// dispatcher uses these instead of synthesizing paths under the shared
/// volume, and skips appending the capture suffix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileOverrides {
    /// Exported-env capture file.
    #[serde(default)]
    pub export_env: Option<String>,

    /// Output-variable capture file.
    #[serde(default)]
    pub output: Option<String>,

    /// Secret-typed output capture file.
    #[serde(default)]
    pub output_secrets: Option<String>,

    /// Artifact capture file.
    #[serde(default)]
    pub artifact: Option<String>,
}

/// Immutable description of one step to execute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartStepRequest {
    /// Step identifier, unique within the engine process. Must be non-empty.
    pub id: String,

    #[serde(default)]
    pub kind: StepKind,

    /// Container image, when the step runs containerized. Detached steps
    /// without an image fork on the host.
    #[serde(default)]
    pub image: String,

    /// Working directory for the command.
    #[serde(default)]
    pub working_dir: String,

    /// Environment handed to the command, merged over the stage env.
    #[serde(default)]
    pub envs: HashMap<String, String>,

    /// Secret values masked out of the live log.
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Wall-clock budget in seconds. Zero means no timeout.
    #[serde(default)]
    pub timeout_secs: u64,

    /// Launch in the background; completion does not gate later steps.
    #[serde(default)]
    pub detach: bool,

    /// Captured mode: duplicate raw output into memory for pull-based
    /// streaming via `stream_output` instead of the live log pipeline.
    #[serde(default)]
    pub capture_output: bool,

    /// Plain output variables captured after the run.
    #[serde(default)]
    pub output_vars: Vec<String>,

    /// Typed output variables captured after the run.
    #[serde(default)]
    pub outputs: Vec<TypedOutput>,

    #[serde(default)]
    pub files: FileOverrides,

    #[serde(default)]
    pub test_report: Option<TestReport>,

    #[serde(default)]
    pub run: RunSpec,

    #[serde(default)]
    pub run_test: Option<RunTestsSpec>,

    #[serde(default)]
    pub run_test_v2: Option<RunTestsV2Spec>,

    /// Log stream key; falls back to the step id when empty.
    #[serde(default)]
    pub log_key: String,

    #[serde(default)]
    pub log_config: LogConfig,

    #[serde(default)]
    pub ti_config: TiConfig,
}

impl StartStepRequest {
    /// Reject requests without an identifier.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ApiError::MissingId);
        }
        Ok(())
    }

    /// Stream key used for the live log.
    pub fn stream_key(&self) -> &str {
        if self.log_key.is_empty() {
            &self.id
        } else {
            &self.log_key
        }
    }
}

/// Input to `poll_step`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollStepRequest {
    pub id: String,
}

impl PollStepRequest {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ApiError::MissingId);
        }
        Ok(())
    }
}

/// Terminal record of one step, frozen once produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollStepResponse {
    /// Whether the runner observed the process exit. Detached steps report
    /// false here; see `detached`.
    pub exited: bool,

    #[serde(default)]
    pub exit_code: i32,

    #[serde(default)]
    pub oom_killed: bool,

    /// The step was launched in the background and left running.
    #[serde(default)]
    pub detached: bool,

    /// Captured plain output variables.
    #[serde(default)]
    pub outputs: HashMap<String, String>,

    /// Exported environment propagated to later steps of the stage.
    #[serde(default)]
    pub envs: HashMap<String, String>,

    /// Raw artifact bytes, base64 on the wire.
    #[serde(default, with = "base64_bytes")]
    pub artifact: Vec<u8>,

    /// Captured typed output variables.
    #[serde(default)]
    pub output_v2: Vec<TypedOutput>,

    /// Cache/TI savings label, e.g. `DISABLED`, `FULL_RUN`, `OPTIMIZED`.
    #[serde(default)]
    pub optimization_state: String,

    /// Opaque telemetry payload from post-run collectors.
    #[serde(default)]
    pub telemetry_data: Option<serde_json::Value>,

    /// Joined multi-error string; empty on success.
    #[serde(default)]
    pub error: String,
}

/// Input to `stream_output`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOutputRequest {
    pub id: String,

    /// Byte offset into the captured output to resume from.
    #[serde(default)]
    pub offset: usize,
}

impl StreamOutputRequest {
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ApiError::MissingId);
        }
        Ok(())
    }
}

/// Serialize `Vec<u8>` as a base64 string, the artifact wire encoding.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
