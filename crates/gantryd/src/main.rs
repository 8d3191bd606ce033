//! Gantry daemon entry point
//!
//! Builds the pipeline context and step executor for this node and waits
//! for shutdown. Request transport is wired by the hosting process; this
//! binary owns process-level concerns: tracing, config, lifecycle.

use anyhow::Result;
use clap::Parser;
use gantry_engine::{PipelineContext, ProcessRunner, StepExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "gantryd")]
#[command(about = "Gantry step-execution engine daemon", long_about = None)]
struct Args {
    /// Shared-volume root for step exchange files.
    /// Falls back to HARNESS_WORKDIR, then /tmp/engine.
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Local file carrying mask patterns, one regex per line.
    #[arg(long)]
    mask_patterns: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

/// Initialise the global tracing subscriber. Safe to call once per process;
/// respects `RUST_LOG`.
fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs, Level::INFO);

    let mut builder = PipelineContext::builder();
    if let Some(workdir) = &args.workdir {
        builder = builder.workdir_root(workdir.clone());
    }
    let ctx = builder.build();

    if let Some(path) = &args.mask_patterns {
        let loaded = ctx.load_mask_patterns_file(path)?;
        info!(loaded, path = %path.display(), "mask patterns applied");
    }

    let executor = StepExecutor::new(Arc::clone(&ctx), Arc::new(ProcessRunner::new()));
    info!(
        version = gantry_engine::VERSION,
        workdir = %ctx.workdir_root().display(),
        "gantryd ready"
    );

    // The executor is handed to the hosting transport from here; standalone
    // invocations just wait for a shutdown signal.
    let _executor = executor;
    tokio::signal::ctrl_c().await?;
    info!("gantryd shutting down");
    Ok(())
}
