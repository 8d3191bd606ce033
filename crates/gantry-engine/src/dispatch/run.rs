//! Plain command execution

use super::collect::{optimization, PostRunCollector};
use super::{prepare, run_and_collect, StepOutcome};
use crate::runner::{CommandRunner, OutputSinks};
use crate::state::PipelineContext;
use gantry_api::StartStepRequest;
use std::sync::Arc;

pub(crate) async fn execute(
    req: &StartStepRequest,
    ctx: &Arc<PipelineContext>,
    runner: &dyn CommandRunner,
    sinks: &OutputSinks,
    collectors: &[Arc<dyn PostRunCollector>],
) -> StepOutcome {
    let prepared = prepare(req, ctx, &req.run.entrypoint, &req.run.command).await;
    run_and_collect(
        req,
        ctx,
        runner,
        sinks,
        collectors,
        prepared,
        optimization::DISABLED,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRunner;
    use gantry_api::step::RunSpec;
    use tempfile::TempDir;

    fn ctx_in(dir: &TempDir) -> Arc<PipelineContext> {
        PipelineContext::builder()
            .workdir_root(dir.path())
            .expand_secret_variants(false)
            .build()
    }

    #[tokio::test]
    async fn test_successful_run_has_clean_outcome() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let runner = ScriptedRunner::succeeding();
        let req = StartStepRequest {
            id: "ok".to_string(),
            run: RunSpec {
                command: vec!["echo hi".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        let outcome = execute(&req, &ctx, &runner, &OutputSinks::default(), &[]).await;
        assert!(outcome.error.is_none());
        assert!(outcome.exit.unwrap().success());
        assert_eq!(outcome.optimization_state, optimization::DISABLED);
    }

    #[tokio::test]
    async fn test_output_request_appends_capture_suffix() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let runner = ScriptedRunner::succeeding();
        let req = StartStepRequest {
            id: "cap".to_string(),
            output_vars: vec!["TOKEN".to_string()],
            run: RunSpec {
                command: vec!["export TOKEN=abc".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        execute(&req, &ctx, &runner, &OutputSinks::default(), &[]).await;

        let specs = runner.specs();
        assert_eq!(specs.len(), 1);
        // The user command survives and the capture statement follows it.
        assert_eq!(specs[0].command[0], "export TOKEN=abc");
        assert!(specs[0].command.iter().any(|c| c.contains("__B64__")));
        assert!(specs[0].envs.contains_key("HARNESS_OUTPUT_FILE"));
    }

    #[tokio::test]
    async fn test_override_suppresses_capture_suffix() {
        let dir = TempDir::new().unwrap();
        let ctx = ctx_in(&dir);
        let runner = ScriptedRunner::succeeding();
        let req = StartStepRequest {
            id: "cap2".to_string(),
            output_vars: vec!["TOKEN".to_string()],
            files: gantry_api::step::FileOverrides {
                output: Some(dir.path().join("custom.env").display().to_string()),
                ..Default::default()
            },
            run: RunSpec {
                command: vec!["true".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        execute(&req, &ctx, &runner, &OutputSinks::default(), &[]).await;
        let specs = runner.specs();
        assert_eq!(specs[0].command.len(), 1, "no capture suffix appended");
    }
}
