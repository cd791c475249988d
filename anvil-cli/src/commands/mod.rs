//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod report;
mod run;

use anyhow::Result;
use clap::Subcommand;

use anvil_engine::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Trigger a pipeline run and wait for it to finish
    Run(run::RunArgs),
    /// Show the current status of a run
    Status {
        /// Run ID
        id: String,
    },
    /// Show the full report of a run
    Report {
        /// Run ID
        id: String,
    },
    /// List known runs, newest first
    List {
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Remove run records older than the retention window
    Purge {
        /// Retention window in days
        #[arg(long)]
        older_than_days: Option<u64>,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module and returns the
/// process exit code.
pub async fn handle_command(command: Commands, config: Config) -> Result<i32> {
    match command {
        Commands::Run(args) => run::handle_run(args, config).await,
        Commands::Status { id } => report::handle_status(&id, config).await,
        Commands::Report { id } => report::handle_report(&id, config).await,
        Commands::List { limit } => report::handle_list(limit, config).await,
        Commands::Purge { older_than_days } => report::handle_purge(older_than_days, config).await,
    }
}
