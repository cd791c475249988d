//! Status and report command handlers
//!
//! Serves the report interface from persisted run records: current status,
//! full per-stage detail with test summary, listings, and retention purge.

use anyhow::{Context, Result};
use colored::Colorize;
use std::time::Duration;
use uuid::Uuid;

use anvil_core::domain::{ReportStatus, RunStatus, StageStatus};
use anvil_core::dto::RunView;
use anvil_engine::{Config, PipelineEngine};

pub async fn handle_status(id: &str, config: Config) -> Result<i32> {
    let engine = PipelineEngine::new(config).await?;
    let id = parse_id(id)?;

    match engine.status(id)? {
        Some(view) => {
            println!(
                "{} {} {} ({}@{})",
                "Run".bold(),
                view.id,
                paint_run_status(view.status),
                view.repo,
                view.revision
            );
            Ok(0)
        }
        None => {
            println!("{}", format!("Run {} not found.", id).yellow());
            Ok(3)
        }
    }
}

pub async fn handle_report(id: &str, config: Config) -> Result<i32> {
    let engine = PipelineEngine::new(config).await?;
    let id = parse_id(id)?;

    match engine.status(id)? {
        Some(view) => {
            print_run(&view);
            Ok(0)
        }
        None => {
            println!("{}", format!("Run {} not found.", id).yellow());
            Ok(3)
        }
    }
}

pub async fn handle_list(limit: usize, config: Config) -> Result<i32> {
    let engine = PipelineEngine::new(config).await?;
    let runs = engine.list()?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
        return Ok(0);
    }

    for view in runs.iter().take(limit) {
        println!(
            "{}  {}  {}  {}@{}",
            view.id,
            view.created_at.format("%Y-%m-%d %H:%M:%S"),
            paint_run_status(view.status),
            view.repo,
            view.revision
        );
    }
    Ok(0)
}

pub async fn handle_purge(older_than_days: Option<u64>, config: Config) -> Result<i32> {
    let retention = older_than_days
        .map(|days| Duration::from_secs(days * 24 * 3600))
        .unwrap_or(config.retention);
    let engine = PipelineEngine::new(config).await?;

    let removed = engine.purge(retention)?;
    println!("Purged {} run record(s).", removed);
    Ok(0)
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("'{}' is not a valid run id", id))
}

/// Renders a run's stages and test summary
pub fn print_run(view: &RunView) {
    println!(
        "{} {} {} ({}@{})",
        "Run".bold(),
        view.id,
        paint_run_status(view.status),
        view.repo,
        view.revision
    );
    println!();

    for stage in &view.stages {
        println!("  {:<12} {}", stage.name, paint_stage_status(stage.status));
        if let Some(error) = &stage.error {
            println!("  {:<12} {}", "", error.red());
        }
    }

    if let Some(summary) = &view.summary {
        println!();
        let counts = format!(
            "{} passed, {} failed, {} skipped ({:.1}s)",
            summary.passed,
            summary.failed,
            summary.skipped,
            summary.total_duration.as_secs_f64()
        );
        match summary.status {
            ReportStatus::Complete => println!("  {}", counts),
            ReportStatus::Incomplete => {
                println!("  {} {}", counts, "(report incomplete)".yellow())
            }
        }
        for (name, message) in &summary.failures {
            match message {
                Some(message) => println!("  {} {}: {}", "FAIL".red().bold(), name, message),
                None => println!("  {} {}", "FAIL".red().bold(), name),
            }
        }
    }
}

fn paint_run_status(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Succeeded => status.to_string().green().bold(),
        RunStatus::Failed => status.to_string().red().bold(),
        RunStatus::Aborted => status.to_string().yellow().bold(),
        RunStatus::Pending | RunStatus::Running => status.to_string().cyan(),
    }
}

fn paint_stage_status(status: StageStatus) -> colored::ColoredString {
    match status {
        StageStatus::Succeeded => status.to_string().green(),
        StageStatus::Failed => status.to_string().red(),
        StageStatus::Aborted => status.to_string().yellow(),
        StageStatus::Skipped => status.to_string().dimmed(),
        StageStatus::Pending | StageStatus::Running => status.to_string().cyan(),
    }
}
