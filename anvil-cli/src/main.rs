//! Anvil CLI
//!
//! Command-line front end for the Anvil CI engine: trigger a pipeline run
//! and wait for it, or inspect persisted run records.
//!
//! Exit codes: 0 = succeeded, 1 = failed (build or test failure),
//! 2 = aborted, 3 = internal/environment error.

mod commands;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anvil_engine::Config;
use commands::{handle_command, Commands};

#[derive(Parser)]
#[command(name = "anvil")]
#[command(about = "Anvil CI engine", long_about = None)]
struct Cli {
    /// State directory for run records and workspaces
    #[arg(long, env = "ANVIL_STATE_DIR")]
    state_dir: Option<String>,

    /// Execution backend: "local" or "container"
    #[arg(long, env = "ANVIL_RUNNER")]
    runner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anvil=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            3
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::from_env()?;
    if let Some(state_dir) = cli.state_dir {
        let state_dir = std::path::PathBuf::from(state_dir);
        config.workspace_root = state_dir.join("workspaces");
        config.state_dir = state_dir;
    }
    if let Some(runner) = cli.runner {
        config.runner = runner.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    }
    config.validate()?;

    handle_command(cli.command, config).await
}
