//! Run command handler
//!
//! Triggers a pipeline run, waits for it to reach a terminal status, and
//! renders the per-stage results and test summary. Ctrl-C aborts the run,
//! killing any in-flight external process, and exits with code 2.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use anvil_core::dto::TriggerRequest;
use anvil_engine::{Config, PipelineEngine};

use super::report::print_run;

/// Arguments for triggering a run
#[derive(Args)]
pub struct RunArgs {
    /// Repository location (URL or local path)
    pub repo: String,

    /// Revision reference to build
    #[arg(long, default_value = "HEAD")]
    pub revision: String,

    /// Test command to run inside the built environment
    #[arg(long)]
    pub test_command: Option<String>,

    /// Build instructions file, relative to the workspace root
    #[arg(long)]
    pub build_file: Option<String>,

    /// Per-stage timeout in seconds
    #[arg(long)]
    pub stage_timeout: Option<u64>,

    /// Overall run timeout in seconds
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Extra best-effort stage as name=command (repeatable)
    #[arg(long = "best-effort-stage", value_parser = parse_stage)]
    pub best_effort_stages: Vec<(String, String)>,
}

fn parse_stage(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, command)) if !name.is_empty() && !command.is_empty() => {
            Ok((name.to_string(), command.to_string()))
        }
        _ => Err("expected name=command".to_string()),
    }
}

pub async fn handle_run(args: RunArgs, config: Config) -> Result<i32> {
    let engine = PipelineEngine::new(config).await?;

    let mut request = TriggerRequest::new(&args.repo, &args.revision);
    request.overrides.test_command = args.test_command;
    request.overrides.build_file = args.build_file;
    request.overrides.stage_timeout = args.stage_timeout.map(Duration::from_secs);
    request.overrides.run_timeout = args.run_timeout.map(Duration::from_secs);
    request.overrides.best_effort_stages = args.best_effort_stages;

    let id = engine.trigger(request)?;
    println!("{} {}", "Triggered run".bold(), id);

    // Ctrl-C aborts the run rather than orphaning its processes.
    let abort_engine = Arc::clone(&engine);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; aborting run {}", id);
            abort_engine.abort(id);
        }
    });

    let view = engine.wait(id).await?;
    println!();
    print_run(&view);

    Ok(view.status.exit_code())
}
