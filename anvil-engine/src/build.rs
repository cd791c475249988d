//! Build execution
//!
//! Invokes the external image builder against a workspace and returns a
//! content-addressed [`BuildArtifact`]. The artifact identifier is a sha256
//! digest over the workspace contents and the build instructions, so
//! identical source and instructions always yield the identical identifier.
//!
//! The cache admits concurrent reads but at most one in-flight build per
//! digest: concurrent requests for the same key await the winner's result
//! instead of duplicating work.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use anvil_core::domain::BuildArtifact;
use anvil_core::EngineError;

use crate::process::{CommandRunner, CommandSpec};

/// Builds artifacts from workspaces, deduplicating identical builds
pub struct BuildExecutor {
    runner: Arc<dyn CommandRunner>,
    cache: Mutex<HashMap<String, Arc<OnceCell<BuildArtifact>>>>,
}

impl BuildExecutor {
    /// Creates an executor with an empty cache
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Builds an artifact from a workspace, or returns the cached one
    ///
    /// Builder failure maps to `EngineError::Build` carrying the captured
    /// build log. A cache hit skips the external builder entirely.
    pub async fn build(
        &self,
        workspace: &Path,
        build_file: &str,
        timeout: Duration,
    ) -> Result<BuildArtifact, EngineError> {
        let digest = workspace_digest(workspace, build_file)?;

        let cell = {
            let mut cache = self.cache.lock().map_err(|_| {
                EngineError::Internal("build cache lock poisoned".to_string())
            })?;
            cache
                .entry(digest.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        if let Some(artifact) = cell.get() {
            debug!("Build cache hit for digest {}", &digest[..16.min(digest.len())]);
            return Ok(artifact.clone());
        }

        let artifact = cell
            .get_or_try_init(|| self.invoke_builder(workspace, build_file, &digest, timeout))
            .await?;

        Ok(artifact.clone())
    }

    async fn invoke_builder(
        &self,
        workspace: &Path,
        build_file: &str,
        digest: &str,
        timeout: Duration,
    ) -> Result<BuildArtifact, EngineError> {
        let artifact = BuildArtifact::new(digest);

        info!(
            "Building image {} from {} in {}",
            artifact.image,
            build_file,
            workspace.display()
        );

        let spec = CommandSpec::new(
            "podman",
            ["build", "-f", build_file, "-t", artifact.image.as_str(), "."],
        )
        .cwd(workspace)
        .timeout(timeout);

        let out = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| e.into_engine_error())?;

        if !out.success() {
            return Err(EngineError::build(
                format!("builder exited with code {}", out.exit_code),
                format!("{}{}", out.stdout, out.stderr),
            ));
        }

        info!("Built artifact {}", artifact.image);
        Ok(artifact)
    }
}

/// Computes the content digest of a workspace plus its build instructions
///
/// Files are hashed in sorted relative-path order; `.git` internals are
/// excluded so the digest reflects the checked-out tree, not clone details.
pub fn workspace_digest(workspace: &Path, build_file: &str) -> Result<String, EngineError> {
    let mut files = Vec::new();
    collect_files(workspace, workspace, &mut files)
        .map_err(|e| EngineError::Internal(format!("failed to read workspace: {}", e)))?;
    files.sort();

    let mut hasher = Sha256::new();
    hasher.update(build_file.as_bytes());
    hasher.update([0u8]);
    for rel in &files {
        let content = std::fs::read(workspace.join(rel))
            .map_err(|e| EngineError::Internal(format!("failed to read {}: {}", rel, e)))?;
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&content);
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .into_owned();
            out.push(rel);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, ProcessError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Builder fake that counts invocations
    struct CountingBuilder {
        invocations: AtomicUsize,
        exit_code: i32,
    }

    impl CountingBuilder {
        fn succeeding() -> Self {
            Self {
                invocations: AtomicUsize::new(0),
                exit_code: 0,
            }
        }

        fn failing() -> Self {
            Self {
                invocations: AtomicUsize::new(0),
                exit_code: 1,
            }
        }
    }

    #[async_trait]
    impl CommandRunner for CountingBuilder {
        async fn run(&self, _spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: "Dockerfile parse error".to_string(),
                exit_code: self.exit_code,
                duration: Duration::from_millis(1),
            })
        }
    }

    fn workspace_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_digest_deterministic_across_directories() {
        let a = workspace_with(&[("app.py", "print('hi')"), ("Dockerfile", "FROM python")]);
        let b = workspace_with(&[("app.py", "print('hi')"), ("Dockerfile", "FROM python")]);
        assert_eq!(
            workspace_digest(a.path(), "Dockerfile").unwrap(),
            workspace_digest(b.path(), "Dockerfile").unwrap()
        );
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = workspace_with(&[("app.py", "print('hi')")]);
        let b = workspace_with(&[("app.py", "print('bye')")]);
        assert_ne!(
            workspace_digest(a.path(), "Dockerfile").unwrap(),
            workspace_digest(b.path(), "Dockerfile").unwrap()
        );
    }

    #[test]
    fn test_digest_changes_with_instructions() {
        let a = workspace_with(&[("app.py", "print('hi')")]);
        assert_ne!(
            workspace_digest(a.path(), "Dockerfile").unwrap(),
            workspace_digest(a.path(), "Dockerfile.ci").unwrap()
        );
    }

    #[test]
    fn test_digest_ignores_git_internals() {
        let a = workspace_with(&[("app.py", "print('hi')")]);
        let b = workspace_with(&[("app.py", "print('hi')"), (".git/HEAD", "ref: main")]);
        assert_eq!(
            workspace_digest(a.path(), "Dockerfile").unwrap(),
            workspace_digest(b.path(), "Dockerfile").unwrap()
        );
    }

    #[tokio::test]
    async fn test_warm_cache_skips_builder() {
        let ws = workspace_with(&[("app.py", "print('hi')")]);
        let runner = Arc::new(CountingBuilder::succeeding());
        let executor = BuildExecutor::new(runner.clone());

        let first = executor
            .build(ws.path(), "Dockerfile", Duration::from_secs(5))
            .await
            .unwrap();
        let second = executor
            .build(ws.path(), "Dockerfile", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(runner.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_identical_builds_run_once() {
        let ws = workspace_with(&[("app.py", "print('hi')")]);
        let runner = Arc::new(CountingBuilder::succeeding());
        let executor = Arc::new(BuildExecutor::new(runner.clone()));

        let (a, b) = tokio::join!(
            executor.build(ws.path(), "Dockerfile", Duration::from_secs(5)),
            executor.build(ws.path(), "Dockerfile", Duration::from_secs(5)),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(runner.invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_builder_failure_carries_log() {
        let ws = workspace_with(&[("app.py", "print('hi')")]);
        let executor = BuildExecutor::new(Arc::new(CountingBuilder::failing()));

        let err = executor
            .build(ws.path(), "Dockerfile", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            EngineError::Build { log, .. } => assert!(log.contains("parse error")),
            other => panic!("expected build error, got {:?}", other),
        }
    }
}
