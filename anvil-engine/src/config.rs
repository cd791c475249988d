//! Engine configuration
//!
//! Defines all configurable parameters for the engine including state and
//! workspace locations, timeouts, retention, and the execution backend.

use std::path::PathBuf;
use std::time::Duration;

/// Execution backend for build and test environments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerKind {
    /// Run everything as local child processes
    #[default]
    Local,
    /// Build and run via podman containers
    Container,
}

impl std::str::FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "container" => Ok(Self::Container),
            other => Err(format!("unknown runner kind '{}'", other)),
        }
    }
}

/// Engine configuration
///
/// All timeouts are configurable to allow tuning for different deployment
/// scenarios (fast unit suites vs long integration builds).
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding persisted run records
    pub state_dir: PathBuf,

    /// Root directory under which per-run workspaces are allocated
    pub workspace_root: PathBuf,

    /// Default per-stage timeout, overridable per trigger
    pub stage_timeout: Duration,

    /// Default overall run timeout, overridable per trigger
    pub run_timeout: Duration,

    /// How long terminal run records are retained before purge
    pub retention: Duration,

    /// Max pipeline runs executing concurrently; excess triggers queue
    pub max_concurrent_runs: usize,

    /// Execution backend
    pub runner: RunnerKind,
}

impl Config {
    /// Creates a configuration rooted at a state directory, with defaults
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        let workspace_root = state_dir.join("workspaces");
        Self {
            state_dir,
            workspace_root,
            stage_timeout: Duration::from_secs(600),
            run_timeout: Duration::from_secs(3600),
            retention: Duration::from_secs(30 * 24 * 3600),
            max_concurrent_runs: 2,
            runner: RunnerKind::Local,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ANVIL_STATE_DIR (optional, default: .anvil)
    /// - ANVIL_WORKSPACE_ROOT (optional, default: <state_dir>/workspaces)
    /// - ANVIL_STAGE_TIMEOUT (optional, seconds, default: 600)
    /// - ANVIL_RUN_TIMEOUT (optional, seconds, default: 3600)
    /// - ANVIL_RETENTION_DAYS (optional, default: 30)
    /// - ANVIL_MAX_CONCURRENT_RUNS (optional, default: 2)
    /// - ANVIL_RUNNER (optional, "local" or "container", default: local)
    pub fn from_env() -> anyhow::Result<Self> {
        let state_dir = std::env::var("ANVIL_STATE_DIR").unwrap_or_else(|_| ".anvil".to_string());
        let mut config = Self::new(state_dir);

        if let Ok(root) = std::env::var("ANVIL_WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }

        if let Some(secs) = env_u64("ANVIL_STAGE_TIMEOUT") {
            config.stage_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ANVIL_RUN_TIMEOUT") {
            config.run_timeout = Duration::from_secs(secs);
        }
        if let Some(days) = env_u64("ANVIL_RETENTION_DAYS") {
            config.retention = Duration::from_secs(days * 24 * 3600);
        }
        if let Some(n) = env_u64("ANVIL_MAX_CONCURRENT_RUNS") {
            config.max_concurrent_runs = n as usize;
        }
        if let Ok(kind) = std::env::var("ANVIL_RUNNER") {
            config.runner = kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!("ANVIL_RUNNER: {}", e))?;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            anyhow::bail!("state_dir cannot be empty");
        }

        if self.workspace_root.as_os_str().is_empty() {
            anyhow::bail!("workspace_root cannot be empty");
        }

        if self.stage_timeout.is_zero() {
            anyhow::bail!("stage_timeout must be greater than 0");
        }

        if self.run_timeout.is_zero() {
            anyhow::bail!("run_timeout must be greater than 0");
        }

        if self.max_concurrent_runs == 0 {
            anyhow::bail!("max_concurrent_runs must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(".anvil")
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stage_timeout, Duration::from_secs(600));
        assert_eq!(config.run_timeout, Duration::from_secs(3600));
        assert_eq!(config.max_concurrent_runs, 2);
        assert_eq!(config.runner, RunnerKind::Local);
        assert_eq!(config.workspace_root, PathBuf::from(".anvil/workspaces"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.stage_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.stage_timeout = Duration::from_secs(60);
        config.max_concurrent_runs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_runner_kind_parsing() {
        assert_eq!("local".parse::<RunnerKind>().unwrap(), RunnerKind::Local);
        assert_eq!(
            "container".parse::<RunnerKind>().unwrap(),
            RunnerKind::Container
        );
        assert!("docker-swarm".parse::<RunnerKind>().is_err());
    }
}
