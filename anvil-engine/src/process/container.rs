//! Containerized execution via podman
//!
//! Instantiates an isolated environment from a build artifact: a detached
//! container with the run's workspace mounted at /workspace, kept alive for
//! the duration of the test stage and force-removed afterwards. Commands
//! are executed in it with `podman exec`, so the stage timeout bounds the
//! exec invocation while the container itself stays cheap to reap.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use anvil_core::domain::BuildArtifact;
use anvil_core::EngineError;

use super::{CommandOutput, CommandRunner, CommandSpec, EnvironmentFactory, LocalRunner, ProcessError};

/// Checks that podman is installed and responding
pub async fn check_podman_available() -> Result<(), EngineError> {
    let runner = LocalRunner::new();
    let out = runner
        .run(&CommandSpec::new("podman", ["--version"]))
        .await
        .map_err(|e| EngineError::Environment(format!("podman unavailable: {}", e)))?;

    if !out.success() {
        return Err(EngineError::Environment(
            "podman is not working correctly".to_string(),
        ));
    }

    info!("Podman is available: {}", out.stdout.trim());
    Ok(())
}

/// Environment factory that starts one container per test stage
pub struct ContainerEnvironmentFactory;

#[async_trait]
impl EnvironmentFactory for ContainerEnvironmentFactory {
    async fn create(
        &self,
        artifact: &BuildArtifact,
        workspace: &Path,
    ) -> Result<Arc<dyn CommandRunner>, EngineError> {
        let runner = ContainerRunner::start(&artifact.image, workspace).await?;
        Ok(Arc::new(runner))
    }
}

/// Runs commands inside a started container
pub struct ContainerRunner {
    name: String,
    inner: LocalRunner,
}

impl ContainerRunner {
    /// Starts a detached container from an image with the workspace mounted
    ///
    /// Failure to start is an environment error: the artifact existed but
    /// no isolated environment could be instantiated from it.
    pub async fn start(image: &str, workspace: &Path) -> Result<Self, EngineError> {
        let name = format!("anvil-{}", uuid::Uuid::new_v4());
        let inner = LocalRunner::new();

        info!("Starting container {} from image {}", name, image);

        // Override any image entrypoint so the keep-alive shell always runs.
        let mount = format!("{}:/workspace", workspace.display());
        let out = inner
            .run(&CommandSpec::new(
                "podman",
                [
                    "run",
                    "-d",
                    "--name",
                    name.as_str(),
                    "--entrypoint",
                    "/bin/sh",
                    "-v",
                    mount.as_str(),
                    "-w",
                    "/workspace",
                    image,
                    "-c",
                    "sleep infinity",
                ],
            ))
            .await
            .map_err(|e| EngineError::Environment(e.to_string()))?;

        if !out.success() {
            return Err(EngineError::Environment(format!(
                "failed to start container from {}: {}",
                image,
                out.stderr.trim()
            )));
        }

        debug!("Container {} started with ID {}", name, out.stdout.trim());
        Ok(Self { name, inner })
    }
}

/// Maps a spec working directory onto the container mount
///
/// Relative paths are resolved under /workspace; absolute paths pass through.
fn exec_working_dir(cwd: Option<&Path>) -> String {
    match cwd.and_then(Path::to_str) {
        Some(dir) if dir.starts_with('/') => dir.to_string(),
        Some(dir) => format!("/workspace/{}", dir),
        None => "/workspace".to_string(),
    }
}

/// Builds the `podman exec` argument list for a command spec
fn exec_args(container: &str, spec: &CommandSpec) -> Vec<String> {
    let mut args = vec![
        "exec".to_string(),
        "-w".to_string(),
        exec_working_dir(spec.cwd.as_deref()),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(container.to_string());
    args.push(spec.program.clone());
    args.extend(spec.args.iter().cloned());
    args
}

#[async_trait]
impl CommandRunner for ContainerRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        debug!("Executing in container {}: {} {:?}", self.name, spec.program, spec.args);

        self.inner
            .run(&CommandSpec::new("podman", exec_args(&self.name, spec)).timeout(spec.timeout))
            .await
    }
}

impl Drop for ContainerRunner {
    fn drop(&mut self) {
        debug!("Removing container {}", self.name);
        let result = std::process::Command::new("podman")
            .arg("rm")
            .arg("-f")
            .arg(&self.name)
            .output();
        match result {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                warn!("Failed to remove container {}: {}", self.name, stderr.trim());
            }
            Err(e) => warn!("Failed to remove container {}: {}", self.name, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Container execution itself needs a podman install; these tests cover
    // the argument translation, which is where the engine logic lives.

    #[test]
    fn test_exec_working_dir_mapping() {
        assert_eq!(exec_working_dir(None), "/workspace");
        assert_eq!(exec_working_dir(Some(Path::new("subdir"))), "/workspace/subdir");
        assert_eq!(exec_working_dir(Some(Path::new("/opt/app"))), "/opt/app");
    }

    #[test]
    fn test_exec_args_shape() {
        let spec = CommandSpec::shell("pytest -q")
            .env("DJANGO_SETTINGS_MODULE", "app.settings")
            .timeout(Duration::from_secs(7));
        let args = exec_args("anvil-123", &spec);
        assert_eq!(
            args,
            [
                "exec",
                "-w",
                "/workspace",
                "-e",
                "DJANGO_SETTINGS_MODULE=app.settings",
                "anvil-123",
                "sh",
                "-c",
                "pytest -q",
            ]
        );
    }
}
