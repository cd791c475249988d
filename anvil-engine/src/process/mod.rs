//! External process capability
//!
//! The engine never shells out directly: every external invocation goes
//! through the [`CommandRunner`] trait, which runs one command with a
//! wall-clock timeout and captured output. Implementations exist for local
//! processes and for containerized execution, so the engine does not
//! hardcode a container runtime.

mod container;
mod local;

pub use container::{check_podman_available, ContainerEnvironmentFactory, ContainerRunner};
pub use local::{LocalEnvironmentFactory, LocalRunner};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use anvil_core::domain::BuildArtifact;
use anvil_core::EngineError;

/// One external command invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Wall-clock limit; the child is killed when exceeded
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a command from a program and arguments
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Creates a `sh -c` command line
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), command.into()])
    }

    /// Sets the working directory
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets the wall-clock timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a completed command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutput {
    /// Whether the command exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Errors from launching or bounding an external command
///
/// A non-zero exit code is not an error; it is reported in
/// [`CommandOutput::exit_code`].
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The process could not be launched
    #[error("failed to launch '{program}': {detail}")]
    Spawn { program: String, detail: String },

    /// The process exceeded its timeout and was killed
    #[error("'{program}' exceeded timeout of {limit_secs}s and was killed")]
    Timeout { program: String, limit_secs: u64 },
}

impl ProcessError {
    /// Maps a process error into the engine taxonomy for a launch context
    ///
    /// Spawn failures become `Execution`; overruns become `Timeout`.
    pub fn into_engine_error(self) -> EngineError {
        match self {
            Self::Spawn { program, detail } => {
                EngineError::Execution(format!("{}: {}", program, detail))
            }
            Self::Timeout { limit_secs, .. } => EngineError::Timeout { limit_secs },
        }
    }
}

/// Runs one external command to completion with captured output
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError>;
}

/// Creates the isolated environment a test suite runs in
///
/// The returned runner executes commands inside an environment instantiated
/// from the build artifact. Instantiation failure is an
/// [`EngineError::Environment`], distinct from a failing suite.
#[async_trait]
pub trait EnvironmentFactory: Send + Sync {
    async fn create(
        &self,
        artifact: &BuildArtifact,
        workspace: &Path,
    ) -> Result<Arc<dyn CommandRunner>, EngineError>;
}
