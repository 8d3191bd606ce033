//! Step executor
//!
//! Single-VM scheduler tracking concurrent steps by identifier. Guarantees:
//! idempotent start, one Running-to-Complete transition per id, terminal
//! status broadcast to every waiter, and writer teardown on all exit paths.
//! The registry mutex is held only across map mutations, never across I/O.

use crate::dispatch::{self, collect::PostRunCollector, StepOutcome};
use crate::error::{EngineError, Result};
use crate::runner::{CommandRunner, OutputSinks};
use crate::state::PipelineContext;
use crate::status::{ExitState, StepState, StepStatus};
use crate::tap::OutputTap;
use gantry_logstream::{LiveLogWriter, Nudge, WriterConfig};
use gantry_api::{PollStepRequest, PollStepResponse, StartStepRequest, StreamOutputRequest};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

/// How long `stream_output` waits for the tap to appear.
const TAP_WAIT_BUDGET: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the tap.
const TAP_WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// Diagnostic hints scanned against closing log tails.
fn default_nudges() -> Vec<Nudge> {
    vec![
        Nudge::new(
            "[Kk]illed",
            "try increasing the step memory or reducing parallelism",
            "the process was killed",
        ),
        Nudge::new(
            "command not found",
            "check that the binary is installed in the step image",
            "missing command",
        ),
    ]
}

#[derive(Default)]
struct Registry {
    statuses: HashMap<String, StepStatus>,
    waiters: HashMap<String, Vec<oneshot::Sender<StepStatus>>>,
    taps: HashMap<String, Arc<OutputTap>>,
}

struct Inner {
    registry: Mutex<Registry>,
    ctx: Arc<PipelineContext>,
    runner: Arc<dyn CommandRunner>,
    collectors: Vec<Arc<dyn PostRunCollector>>,
    writer_config: WriterConfig,
    nudges: Vec<Nudge>,
}

/// Registry of step statuses with start/poll/stream operations.
#[derive(Clone)]
pub struct StepExecutor {
    inner: Arc<Inner>,
}

impl StepExecutor {
    pub fn new(ctx: Arc<PipelineContext>, runner: Arc<dyn CommandRunner>) -> Self {
        Self::with_collectors(ctx, runner, Vec::new())
    }

    /// Executor with post-run collectors registered.
    pub fn with_collectors(
        ctx: Arc<PipelineContext>,
        runner: Arc<dyn CommandRunner>,
        collectors: Vec<Arc<dyn PostRunCollector>>,
    ) -> Self {
        StepExecutor {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry::default()),
                ctx,
                runner,
                collectors,
                writer_config: WriterConfig::default(),
                nudges: default_nudges(),
            }),
        }
    }

    /// Register and launch a step.
    ///
    /// Idempotent: a second start for an active identifier reports success
    /// without launching anything.
    pub async fn start_step(&self, req: StartStepRequest) -> Result<()> {
        req.validate()?;

        {
            let mut registry = self.inner.registry.lock().await;
            if registry.statuses.contains_key(&req.id) {
                return Ok(());
            }
            registry
                .statuses
                .insert(req.id.clone(), StepStatus::running());
            if req.capture_output {
                registry.taps.insert(req.id.clone(), OutputTap::new());
            }
        }

        info!(step_id = %req.id, kind = ?req.kind, detach = req.detach, "step started");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_step(req).await;
        });
        Ok(())
    }

    /// Return the terminal status, blocking until the step completes.
    pub async fn poll_step(&self, req: &PollStepRequest) -> Result<PollStepResponse> {
        req.validate()?;

        let rx = {
            let mut registry = self.inner.registry.lock().await;
            match registry.statuses.get(&req.id) {
                None => return Err(EngineError::NotStarted(req.id.clone())),
                Some(status) if status.is_complete() => return Ok(status.to_response()),
                Some(_) => {
                    let (tx, rx) = oneshot::channel();
                    registry.waiters.entry(req.id.clone()).or_default().push(tx);
                    rx
                }
            }
        };

        let status = rx
            .await
            .map_err(|_| EngineError::Internal("step worker dropped".to_string()))?;
        Ok(status.to_response())
    }

    /// Resume the captured output stream from a byte offset.
    ///
    /// Returns the already-captured bytes past the offset plus a channel of
    /// future chunks; the channel ends when the step completes or the
    /// subscriber goes away.
    pub async fn stream_output(
        &self,
        req: &StreamOutputRequest,
    ) -> Result<(Vec<u8>, mpsc::Receiver<Vec<u8>>)> {
        req.validate()?;

        // The tap registers synchronously with start_step, but callers may
        // race the start request; give it a bounded grace period.
        let mut waited = Duration::ZERO;
        let tap = loop {
            if let Some(tap) = self.inner.registry.lock().await.taps.get(&req.id).cloned() {
                break tap;
            }
            if waited >= TAP_WAIT_BUDGET {
                return Err(EngineError::NotStarted(req.id.clone()));
            }
            tokio::time::sleep(TAP_WAIT_INTERVAL).await;
            waited += TAP_WAIT_INTERVAL;
        };

        let (prefix, subscriber_id, rx) = tap.subscribe(req.offset).await?;

        let watcher_tap = Arc::clone(&tap);
        tokio::spawn(async move {
            let mut done = watcher_tap.done();
            if !*done.borrow() {
                let _ = done.changed().await;
            }
            watcher_tap.unsubscribe(subscriber_id).await;
        });

        Ok((prefix, rx))
    }

    /// Current completion state without blocking; test and admin helper.
    pub async fn step_state(&self, id: &str) -> Option<StepState> {
        let registry = self.inner.registry.lock().await;
        registry.statuses.get(id).and_then(|s| s.state)
    }
}

impl Inner {
    async fn run_step(self: Arc<Self>, req: StartStepRequest) {
        let tap = self.registry.lock().await.taps.get(&req.id).cloned();

        // Captured-only mode skips the live log pipeline entirely.
        let writer = if req.capture_output {
            None
        } else {
            self.build_writer(&req)
        };

        let sinks = OutputSinks {
            writer: writer.clone(),
            tap,
        };

        let status = if req.detach && req.image.is_empty() {
            Self::launch_detached(&self, &req, sinks, writer)
        } else {
            self.run_attached(&req, sinks, writer).await
        };

        self.publish(&req.id, status).await;
    }

    fn build_writer(&self, req: &StartStepRequest) -> Option<Arc<LiveLogWriter>> {
        let client = match self.ctx.log_client(&req.log_config) {
            Ok(client) => client,
            Err(err) => {
                warn!(step_id = %req.id, error = %err, "failed to build log client");
                return None;
            }
        };
        let masker = self.ctx.masker_for(&req.secrets);
        let config = WriterConfig {
            stdout_echo: req.log_config.stdout_echo,
            ..self.writer_config.clone()
        };
        let writer = Arc::new(LiveLogWriter::new(
            client,
            masker,
            req.stream_key(),
            &req.id,
            self.nudges.clone(),
            config,
        ));

        // Open in the background: an unreachable log service must not
        // delay or fail the step start.
        let opener = Arc::clone(&writer);
        let step_id = req.id.clone();
        tokio::spawn(async move {
            if let Err(err) = opener.open().await {
                warn!(step_id = %step_id, error = %err, "log stream open failed");
            }
        });

        Some(writer)
    }

    /// Fork the run into its own task and complete the registry entry
    /// immediately. The daemon's task owns the writer teardown.
    fn launch_detached(
        this: &Arc<Self>,
        req: &StartStepRequest,
        sinks: OutputSinks,
        writer: Option<Arc<LiveLogWriter>>,
    ) -> StepStatus {
        let inner = Arc::clone(this);
        let daemon_req = req.clone();
        tokio::spawn(async move {
            let outcome = dispatch::dispatch(
                &daemon_req,
                &inner.ctx,
                inner.runner.as_ref(),
                &sinks,
                &inner.collectors,
            )
            .await;
            if let Some(err) = &outcome.error {
                warn!(step_id = %daemon_req.id, error = %err, "detached step failed");
            }
            if let Some(writer) = writer {
                if let Err(err) = writer.close().await {
                    warn!(step_id = %daemon_req.id, error = %err, "detached log close failed");
                }
            }
        });

        StepStatus {
            state: Some(StepState::Complete),
            exit: Some(ExitState {
                exit_code: 0,
                oom_killed: false,
                exited: false,
            }),
            detached: true,
            ..Default::default()
        }
    }

    async fn run_attached(
        &self,
        req: &StartStepRequest,
        sinks: OutputSinks,
        writer: Option<Arc<LiveLogWriter>>,
    ) -> StepStatus {
        let dispatched = dispatch::dispatch(
            req,
            &self.ctx,
            self.runner.as_ref(),
            &sinks,
            &self.collectors,
        );

        let outcome = if req.timeout_secs > 0 {
            match tokio::time::timeout(Duration::from_secs(req.timeout_secs), dispatched).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(step_id = %req.id, timeout_secs = req.timeout_secs, "step timed out");
                    StepOutcome::from_error(&EngineError::DeadlineExceeded)
                }
            }
        } else {
            dispatched.await
        };

        // Writer teardown runs on every exit path, timeout included.
        let mut log_errors = Vec::new();
        if let Some(writer) = writer {
            if let Err(err) = writer.close().await {
                warn!(step_id = %req.id, error = %err, "log close failed");
                log_errors.push(format!("failed to upload logs: {err}"));
            }
            log_errors.extend(writer.errors());
        }

        StepStatus {
            state: Some(StepState::Complete),
            exit: outcome.exit,
            error: outcome.error,
            envs: outcome.exported_envs,
            outputs: outcome.outputs,
            typed_outputs: outcome.typed_outputs,
            artifact: outcome.artifact,
            optimization_state: outcome.optimization_state,
            telemetry: outcome.telemetry,
            log_errors,
            detached: false,
        }
    }

    /// Freeze the terminal status and wake every waiter. The status lands
    /// in the registry before any waiter observes it.
    async fn publish(&self, id: &str, status: StepStatus) {
        let waiters = {
            let mut registry = self.registry.lock().await;
            registry.statuses.insert(id.to_string(), status.clone());
            if let Some(tap) = registry.taps.get(id) {
                tap.mark_done();
            }
            registry.waiters.remove(id).unwrap_or_default()
        };

        info!(step_id = %id, waiters = waiters.len(), "step complete");
        for waiter in waiters {
            let _ = waiter.send(status.clone());
        }
    }
}
