//! Workspace management
//!
//! Allocates one isolated checkout directory per pipeline run and tears it
//! down when the run terminates. The directory path embeds the run id, so
//! no two concurrent runs can share a workspace. Cleanup happens in `Drop`,
//! which also covers abnormal termination of the owning run task.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use anvil_core::EngineError;

use crate::process::{CommandRunner, CommandSpec};

/// Allocates and checks out per-run workspaces
pub struct WorkspaceManager {
    root: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl WorkspaceManager {
    /// Creates a manager rooted at a directory
    pub fn new(root: impl Into<PathBuf>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            root: root.into(),
            runner,
        }
    }

    /// Allocates an empty workspace directory for a run
    pub fn allocate(&self, run_id: Uuid) -> Result<Workspace, EngineError> {
        let path = self.root.join(format!("run-{}", run_id));
        std::fs::create_dir_all(&path).map_err(|e| {
            EngineError::Internal(format!(
                "failed to allocate workspace {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!("Allocated workspace {}", path.display());
        Ok(Workspace { path })
    }

    /// Checks a revision out into a fresh workspace for a run
    ///
    /// Clone or checkout failure (unreachable repository, auth, missing
    /// revision) maps to `EngineError::Checkout` carrying the captured
    /// stderr. Timeout and launch failures keep their own variants.
    pub async fn checkout(
        &self,
        repo: &str,
        revision: &str,
        run_id: Uuid,
        timeout: Duration,
    ) -> Result<Workspace, EngineError> {
        let workspace = self.allocate(run_id)?;

        info!("Checking out {}@{} for run {}", repo, revision, run_id);

        let dest = workspace.path.display().to_string();
        let clone =
            CommandSpec::new("git", ["clone", "--quiet", repo, dest.as_str()]).timeout(timeout);

        let out = self
            .runner
            .run(&clone)
            .await
            .map_err(|e| e.into_engine_error())?;
        if !out.success() {
            return Err(EngineError::checkout(repo, revision, out.stderr.trim()));
        }

        let checkout = CommandSpec::new("git", ["checkout", "--quiet", "--detach", revision])
            .cwd(&workspace.path)
            .timeout(timeout);

        let out = self
            .runner
            .run(&checkout)
            .await
            .map_err(|e| e.into_engine_error())?;
        if !out.success() {
            return Err(EngineError::checkout(repo, revision, out.stderr.trim()));
        }

        debug!("Checkout complete for run {}", run_id);
        Ok(workspace)
    }
}

/// An allocated per-run directory, removed on drop
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {}", self.path.display(), e);
            }
        } else {
            debug!("Removed workspace {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, ProcessError};
    use async_trait::async_trait;

    /// Runner that scripts git's behavior without a real repository
    struct ScriptedGit {
        clone_exit: i32,
        checkout_exit: i32,
        stderr: String,
    }

    #[async_trait]
    impl CommandRunner for ScriptedGit {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
            let exit_code = match spec.args.first().map(String::as_str) {
                Some("clone") => self.clone_exit,
                Some("checkout") => self.checkout_exit,
                _ => 0,
            };
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: self.stderr.clone(),
                exit_code,
                duration: Duration::from_millis(1),
            })
        }
    }

    fn manager(dir: &Path, runner: ScriptedGit) -> WorkspaceManager {
        WorkspaceManager::new(dir, Arc::new(runner))
    }

    #[tokio::test]
    async fn test_checkout_creates_run_scoped_directory() {
        let root = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let mgr = manager(
            root.path(),
            ScriptedGit {
                clone_exit: 0,
                checkout_exit: 0,
                stderr: String::new(),
            },
        );

        let ws = mgr
            .checkout("https://example.com/app.git", "abc123", run_id, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(ws.path().ends_with(format!("run-{}", run_id)));
        assert!(ws.path().is_dir());
    }

    #[tokio::test]
    async fn test_distinct_runs_get_distinct_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path(), Arc::new(crate::process::LocalRunner::new()));

        let a = mgr.allocate(Uuid::new_v4()).unwrap();
        let b = mgr.allocate(Uuid::new_v4()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_clone_failure_maps_to_checkout_error() {
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(
            root.path(),
            ScriptedGit {
                clone_exit: 128,
                checkout_exit: 0,
                stderr: "fatal: repository not found".to_string(),
            },
        );

        let err = mgr
            .checkout("https://example.com/gone.git", "abc123", Uuid::new_v4(), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            EngineError::Checkout { detail, .. } => assert!(detail.contains("not found")),
            other => panic!("expected checkout error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_revision_maps_to_checkout_error() {
        let root = tempfile::tempdir().unwrap();
        let mgr = manager(
            root.path(),
            ScriptedGit {
                clone_exit: 0,
                checkout_exit: 1,
                stderr: "error: pathspec 'nope' did not match".to_string(),
            },
        );

        let err = mgr
            .checkout("https://example.com/app.git", "nope", Uuid::new_v4(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Checkout { .. }));
    }

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let mgr = WorkspaceManager::new(root.path(), Arc::new(crate::process::LocalRunner::new()));

        let ws = mgr.allocate(Uuid::new_v4()).unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(path.join("file.txt"), b"content").unwrap();

        drop(ws);
        assert!(!path.exists());
    }
}
