//! Instrumented (v2) test execution
//!
//! No command synthesis: the user command runs as-is and the test agent is
//! injected through the environment. Test globs tell the agent what to
//! intercept; report collection and TI upload run as post-run collectors.

use super::collect::{optimization, PostRunCollector};
use super::{prepare, run_and_collect, StepOutcome};
use crate::runner::{CommandRunner, OutputSinks};
use crate::state::PipelineContext;
use gantry_api::StartStepRequest;
use std::sync::Arc;

/// Env var the test agent reads its glob list from.
const TEST_GLOBS_ENV: &str = "HARNESS_TEST_GLOBS";

pub(crate) async fn execute(
    req: &StartStepRequest,
    ctx: &Arc<PipelineContext>,
    runner: &dyn CommandRunner,
    sinks: &OutputSinks,
    collectors: &[Arc<dyn PostRunCollector>],
) -> StepOutcome {
    let spec = req.run_test_v2.clone().unwrap_or_default();

    let mut prepared = prepare(req, ctx, &spec.entrypoint, &spec.command).await;
    if !spec.test_globs.is_empty() {
        prepared
            .spec
            .envs
            .insert(TEST_GLOBS_ENV.to_string(), spec.test_globs.join(","));
    }

    let default_label = if ctx.ti_config().is_configured() {
        optimization::FULL_RUN
    } else {
        optimization::DISABLED
    };

    run_and_collect(req, ctx, runner, sinks, collectors, prepared, default_label).await
}
