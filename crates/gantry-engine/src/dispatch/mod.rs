//! Run-kind dispatch
//!
//! Every kind shares one recipe: synthesize the exec spec from the request,
//! resolve exchange paths, append the output-capture suffix, inject the
//! engine environment, run, then collect artifacts best-effort. The kinds
//! differ only in command synthesis and their default optimization label.

pub mod capture;
pub mod collect;
pub mod outputs;
pub mod paths;

mod run;
mod run_tests_v2;

use crate::error::EngineError;
use crate::runner::{CommandRunner, ExecSpec, OutputSinks};
use crate::state::PipelineContext;
use crate::status::ExitState;
use capture::ShellDialect;
use collect::PostRunCollector;
use gantry_api::{OutputKind, StartStepRequest, StepKind, TypedOutput};
use paths::StepPaths;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Terminal result of one dispatched run. Errors are folded in: the
/// executor publishes whatever this carries.
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub exit: Option<ExitState>,
    pub error: Option<String>,
    pub outputs: HashMap<String, String>,
    pub exported_envs: HashMap<String, String>,
    pub artifact: Vec<u8>,
    pub typed_outputs: Vec<TypedOutput>,
    pub telemetry: Option<Value>,
    pub optimization_state: String,
}

/// Dispatch a step to its kind handler.
pub async fn dispatch(
    req: &StartStepRequest,
    ctx: &Arc<PipelineContext>,
    runner: &dyn CommandRunner,
    sinks: &OutputSinks,
    collectors: &[Arc<dyn PostRunCollector>],
) -> StepOutcome {
    match req.kind {
        StepKind::Run => run::execute(req, ctx, runner, sinks, collectors).await,
        StepKind::RunTests => run_tests::execute(req, ctx, runner, sinks, collectors).await,
        StepKind::RunTestsV2 => run_tests_v2::execute(req, ctx, runner, sinks, collectors).await,
    }
}

/// A step ready to hand to the runner.
pub(crate) struct PreparedStep {
    pub spec: ExecSpec,
    pub paths: StepPaths,
    pub output_keys: Vec<String>,
    pub secret_output_keys: Vec<String>,
    pub wants_outputs: bool,
}

/// Shared front half of the recipe: spec synthesis, paths, capture suffix,
/// engine env injection.
pub(crate) async fn prepare(
    req: &StartStepRequest,
    ctx: &PipelineContext,
    entrypoint: &[String],
    command: &[String],
) -> PreparedStep {
    let step_paths = paths::resolve(req, ctx.workdir_root());

    for dir in [ctx.workdir_root(), step_paths.scratch.as_path()] {
        if let Err(err) = tokio::fs::create_dir_all(dir).await {
            warn!(dir = %dir.display(), error = %err, "failed to create step directory");
        }
    }

    let mut output_keys: Vec<String> = req.output_vars.clone();
    let mut secret_output_keys: Vec<String> = Vec::new();
    for typed in &req.outputs {
        match typed.kind {
            OutputKind::Secret => secret_output_keys.push(typed.key.clone()),
            OutputKind::String => {
                if !output_keys.contains(&typed.key) {
                    output_keys.push(typed.key.clone());
                }
            }
        }
    }
    let wants_outputs = !output_keys.is_empty() || !secret_output_keys.is_empty();

    let mut command: Vec<String> = command.to_vec();
    if wants_outputs && !step_paths.output_overridden {
        let dialect = ShellDialect::detect(entrypoint);
        command.extend(dialect.capture_lines(&step_paths.output, &output_keys));
        command.extend(dialect.capture_lines(&step_paths.output_secrets, &secret_output_keys));
    }

    // Stage env first, request env over it, engine env last.
    let mut envs = ctx.stage_env().snapshot();
    envs.extend(req.envs.iter().map(|(k, v)| (k.clone(), v.clone())));
    paths::inject_env(&mut envs, &step_paths, &ctx.ti_config());

    PreparedStep {
        spec: ExecSpec {
            id: req.id.clone(),
            entrypoint: entrypoint.to_vec(),
            command,
            working_dir: req.working_dir.clone(),
            envs,
        },
        paths: step_paths,
        output_keys,
        secret_output_keys,
        wants_outputs,
    }
}

/// Shared back half: run, collect exchange files and collector outputs,
/// apply the failure policy, clean up.
pub(crate) async fn run_and_collect(
    req: &StartStepRequest,
    ctx: &PipelineContext,
    runner: &dyn CommandRunner,
    sinks: &OutputSinks,
    collectors: &[Arc<dyn PostRunCollector>],
    prepared: PreparedStep,
    default_optimization: &str,
) -> StepOutcome {
    let started = std::time::Instant::now();
    let run_result = runner.run(&prepared.spec, sinks).await;
    info!(
        step_id = %req.id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        success = matches!(&run_result, Ok(e) if e.success()),
        "step run finished"
    );

    let mut outcome = StepOutcome {
        optimization_state: default_optimization.to_string(),
        ..Default::default()
    };
    let mut collection_errors: Vec<String> = Vec::new();

    // Readback runs regardless of the run result: a failing step may still
    // have exported data worth surfacing.
    let flag_decode = outputs::use_new_reader();
    match outputs::read_env_file_optional(&prepared.paths.export_env, flag_decode).await {
        Ok(envs) => {
            ctx.stage_env().export(&envs);
            outcome.exported_envs = envs;
        }
        Err(err) => collection_errors.push(format!("exported env readback: {err}")),
    }

    if prepared.wants_outputs {
        // Values written by our own capture suffix are always base64
        // wrapped; caller-managed files follow the reader flag.
        let decode = flag_decode || !prepared.paths.output_overridden;
        match outputs::read_env_file(&prepared.paths.output, decode).await {
            Ok(parsed) => {
                for key in &prepared.output_keys {
                    if let Some(value) = parsed.get(key) {
                        outcome.outputs.insert(key.clone(), value.clone());
                        outcome.typed_outputs.push(TypedOutput {
                            key: key.clone(),
                            value: value.clone(),
                            kind: OutputKind::String,
                        });
                    }
                }
            }
            Err(err) => collection_errors.push(format!("output readback: {err}")),
        }

        if !prepared.secret_output_keys.is_empty() {
            match outputs::read_env_file(&prepared.paths.output_secrets, decode).await {
                Ok(parsed) => {
                    for key in &prepared.secret_output_keys {
                        if let Some(value) = parsed.get(key) {
                            outcome.typed_outputs.push(TypedOutput {
                                key: key.clone(),
                                value: value.clone(),
                                kind: OutputKind::Secret,
                            });
                        }
                    }
                }
                Err(err) => collection_errors.push(format!("secret output readback: {err}")),
            }
        }
    }

    outcome.artifact = outputs::read_artifact(&prepared.paths.artifact).await;

    match run_result {
        Ok(exit) => {
            let collection = collect::run_collectors(collectors, req, &exit).await;
            collection_errors.extend(collection.errors.iter().cloned());
            if let Some(label) = &collection.optimization_state {
                outcome.optimization_state = label.clone();
            }
            outcome.telemetry = collection.telemetry.clone();
            let exit = collect::apply_exit_override(exit, &collection);
            outcome.exit = Some(exit);

            // A successful step must not silently lose collected data; the
            // first collection error becomes the step error. Failed steps
            // keep their own error and collection issues stay logged.
            if exit.success() {
                if let Some(first) = collection_errors.first() {
                    outcome.error = Some(first.clone());
                }
            } else if !collection_errors.is_empty() {
                warn!(step_id = %req.id, errors = ?collection_errors,
                      "collection errors on failed step suppressed");
            }
        }
        Err(err) => {
            outcome.error = Some(err.to_string());
            if !collection_errors.is_empty() {
                warn!(step_id = %req.id, errors = ?collection_errors,
                      "collection errors on failed step suppressed");
            }
        }
    }

    cleanup(&prepared).await;
    outcome
}

/// Remove synthesized exchange files. Overridden paths belong to the
/// caller and are left alone.
async fn cleanup(prepared: &PreparedStep) {
    let paths = &prepared.paths;
    let mut targets = Vec::new();
    if !paths.export_env_overridden {
        targets.push(&paths.export_env);
    }
    if !paths.artifact_overridden {
        targets.push(&paths.artifact);
    }
    if !paths.output_overridden {
        targets.push(&paths.output);
        targets.push(&paths.output_secrets);
    }
    for path in targets {
        let _ = tokio::fs::remove_file(path).await;
    }
    let _ = tokio::fs::remove_dir_all(&paths.scratch).await;
}

impl StepOutcome {
    /// Outcome for a run that never produced an exit record, e.g. timeout.
    pub fn from_error(err: &EngineError) -> Self {
        StepOutcome {
            error: Some(err.to_string()),
            ..Default::default()
        }
    }
}
