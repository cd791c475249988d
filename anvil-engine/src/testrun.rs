//! Test execution
//!
//! Runs the test command inside an isolated environment instantiated from
//! the build artifact. A non-zero suite exit code is NOT an engine error:
//! it is domain data carried on the report. Only launch failures, timeout
//! kills, and environment instantiation failures surface as errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use anvil_core::domain::{BuildArtifact, TestReport};
use anvil_core::EngineError;

use crate::process::{CommandOutput, CommandSpec, EnvironmentFactory};

/// Outcome of one test stage execution
#[derive(Debug)]
pub struct TestRun {
    pub output: CommandOutput,
    pub report: TestReport,
}

impl TestRun {
    /// Whether the suite itself passed
    pub fn suite_passed(&self) -> bool {
        self.output.success()
    }
}

/// Executes test commands in artifact-derived environments
pub struct TestRunner {
    environments: Arc<dyn EnvironmentFactory>,
}

impl TestRunner {
    pub fn new(environments: Arc<dyn EnvironmentFactory>) -> Self {
        Self { environments }
    }

    /// Runs the test command and parses its structured report
    ///
    /// Errors: `Environment` when the isolated environment cannot be
    /// instantiated, `Execution` when the command cannot be launched,
    /// `Timeout` when the wall-clock limit is exceeded (the process is
    /// force-killed; no orphan survives).
    pub async fn run(
        &self,
        artifact: &BuildArtifact,
        workspace: &Path,
        command: &str,
        timeout: Duration,
    ) -> Result<TestRun, EngineError> {
        let env = self.environments.create(artifact, workspace).await?;

        info!("Running test command '{}' in {}", command, artifact.image);

        let spec = CommandSpec::shell(command).timeout(timeout);
        let output = env.run(&spec).await.map_err(|e| e.into_engine_error())?;

        let report = TestReport::parse(&output.stdout, output.exit_code);
        debug!(
            "Test command exited with code {}: {} outcome(s), truncated={}",
            output.exit_code,
            report.len(),
            report.truncated
        );

        Ok(TestRun { output, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandRunner, ProcessError};
    use anvil_core::domain::TestStatus;
    use async_trait::async_trait;

    enum Script {
        Output { stdout: String, exit_code: i32 },
        Hang,
        EnvironmentBroken,
    }

    struct ScriptedEnvironment {
        script: Script,
    }

    #[async_trait]
    impl EnvironmentFactory for ScriptedEnvironment {
        async fn create(
            &self,
            _artifact: &BuildArtifact,
            _workspace: &Path,
        ) -> Result<Arc<dyn CommandRunner>, EngineError> {
            match &self.script {
                Script::EnvironmentBroken => Err(EngineError::Environment(
                    "image could not be instantiated".to_string(),
                )),
                Script::Output { stdout, exit_code } => Ok(Arc::new(CannedRunner {
                    stdout: stdout.clone(),
                    exit_code: *exit_code,
                    hang: false,
                })),
                Script::Hang => Ok(Arc::new(CannedRunner {
                    stdout: String::new(),
                    exit_code: 0,
                    hang: true,
                })),
            }
        }
    }

    struct CannedRunner {
        stdout: String,
        exit_code: i32,
        hang: bool,
    }

    #[async_trait]
    impl CommandRunner for CannedRunner {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
            if self.hang {
                tokio::time::sleep(spec.timeout).await;
                return Err(ProcessError::Timeout {
                    program: spec.program.clone(),
                    limit_secs: spec.timeout.as_secs(),
                });
            }
            Ok(CommandOutput {
                stdout: self.stdout.clone(),
                stderr: String::new(),
                exit_code: self.exit_code,
                duration: Duration::from_millis(1),
            })
        }
    }

    fn runner_with(script: Script) -> TestRunner {
        TestRunner::new(Arc::new(ScriptedEnvironment { script }))
    }

    fn artifact() -> BuildArtifact {
        BuildArtifact::new("cafe0123cafe0123")
    }

    #[tokio::test]
    async fn test_passing_suite_yields_report() {
        let stdout = "{\"test\": \"test_a\", \"status\": \"passed\"}\n".to_string();
        let runner = runner_with(Script::Output { stdout, exit_code: 0 });

        let run = runner
            .run(&artifact(), Path::new("/tmp"), "pytest -q", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(run.suite_passed());
        assert_eq!(run.report.len(), 1);
        assert_eq!(run.report.outcomes[0].status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn test_failing_suite_is_a_report_not_an_error() {
        let stdout = "{\"test\": \"test_a\", \"status\": \"failed\", \"message\": \"boom\"}\n".to_string();
        let runner = runner_with(Script::Output { stdout, exit_code: 1 });

        let run = runner
            .run(&artifact(), Path::new("/tmp"), "pytest -q", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!run.suite_passed());
        assert_eq!(run.report.exit_code, 1);
        assert_eq!(run.report.outcomes[0].status, TestStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_suite_times_out() {
        let runner = runner_with(Script::Hang);

        let err = runner
            .run(&artifact(), Path::new("/tmp"), "pytest -q", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { limit_secs: 60 }));
    }

    #[tokio::test]
    async fn test_broken_environment_is_distinct_from_failure() {
        let runner = runner_with(Script::EnvironmentBroken);

        let err = runner
            .run(&artifact(), Path::new("/tmp"), "pytest -q", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Environment(_)));
        assert!(err.is_infrastructure());
    }
}
