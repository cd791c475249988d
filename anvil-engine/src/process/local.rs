//! Local process execution
//!
//! Runs commands as child processes of the engine. `kill_on_drop` ensures
//! that a timed-out or cancelled invocation leaves no orphan behind: when
//! the wait future is dropped, the child receives SIGKILL.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use anvil_core::domain::BuildArtifact;
use anvil_core::EngineError;

use super::{CommandOutput, CommandRunner, CommandSpec, EnvironmentFactory, ProcessError};

/// Runs commands as local child processes
#[derive(Debug, Default, Clone)]
pub struct LocalRunner;

impl LocalRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        debug!("Executing locally: {} {:?}", spec.program, spec.args);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let start = Instant::now();
        let child = command.spawn().map_err(|e| ProcessError::Spawn {
            program: spec.program.clone(),
            detail: e.to_string(),
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ProcessError::Spawn {
                    program: spec.program.clone(),
                    detail: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ProcessError::Timeout {
                    program: spec.program.clone(),
                    limit_secs: spec.timeout.as_secs(),
                });
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            "Command completed: exit_code={}, stdout_len={}, stderr_len={}",
            exit_code,
            output.stdout.len(),
            output.stderr.len()
        );

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            duration: start.elapsed(),
        })
    }
}

/// Environment factory for local execution
///
/// The "environment" is the run's workspace directory: commands run with
/// the workspace as their working directory and the artifact reference
/// exported, so the same pipeline semantics hold without a container
/// runtime installed.
pub struct LocalEnvironmentFactory;

#[async_trait]
impl EnvironmentFactory for LocalEnvironmentFactory {
    async fn create(
        &self,
        artifact: &BuildArtifact,
        workspace: &Path,
    ) -> Result<Arc<dyn CommandRunner>, EngineError> {
        if !workspace.is_dir() {
            return Err(EngineError::Environment(format!(
                "workspace {} does not exist",
                workspace.display()
            )));
        }
        Ok(Arc::new(WorkspaceScopedRunner {
            inner: LocalRunner::new(),
            workspace: workspace.to_path_buf(),
            image: artifact.image.clone(),
        }))
    }
}

/// Local runner pinned to a workspace directory
struct WorkspaceScopedRunner {
    inner: LocalRunner,
    workspace: PathBuf,
    image: String,
}

#[async_trait]
impl CommandRunner for WorkspaceScopedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        let scoped = CommandSpec {
            cwd: Some(spec.cwd.clone().unwrap_or_else(|| self.workspace.clone())),
            env: {
                let mut env = spec.env.clone();
                env.push(("ANVIL_IMAGE".to_string(), self.image.clone()));
                env
            },
            ..spec.clone()
        };
        self.inner.run(&scoped).await
    }
}
