//! Pipeline and stage specification types
//!
//! A pipeline is data: an ordered list of stage specifications interpreted
//! by the engine, not a script. The engine supplies a default
//! checkout -> build -> test sequence; callers override commands and
//! timeouts or append extra stages.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-stage timeout
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);

/// Default overall run timeout
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(3600);

/// Specification of one pipeline execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub repo: String,
    pub revision: String,
    /// Build instructions file, relative to the workspace root
    pub build_file: String,
    /// Command the test stage runs inside the built environment
    pub test_command: String,
    pub stages: Vec<StageSpec>,
    /// Wall-clock limit for the whole run
    pub run_timeout: Duration,
}

impl PipelineSpec {
    /// Creates the default checkout -> build -> test pipeline for a revision
    pub fn new(repo: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
            build_file: "Dockerfile".to_string(),
            test_command: "python manage.py test".to_string(),
            stages: vec![
                StageSpec::new("checkout", StageKind::Checkout),
                StageSpec::new("build", StageKind::Build),
                StageSpec::new("test", StageKind::Test),
            ],
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Overrides the test command
    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.test_command = command.into();
        self
    }

    /// Overrides the build instructions file
    pub fn with_build_file(mut self, file: impl Into<String>) -> Self {
        self.build_file = file.into();
        self
    }

    /// Sets the same timeout on every stage
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        for stage in &mut self.stages {
            stage.timeout = timeout;
        }
        self
    }

    /// Sets the overall run timeout
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Appends a best-effort custom stage that runs after the built-in ones
    ///
    /// Its failure is recorded but does not fail the run.
    pub fn with_best_effort_stage(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        let mut stage = StageSpec::new(name, StageKind::Custom { command: command.into() });
        stage.best_effort = true;
        self.stages.push(stage);
        self
    }

    /// Validates the specification
    pub fn validate(&self) -> Result<(), String> {
        if self.repo.is_empty() {
            return Err("repository location cannot be empty".to_string());
        }
        if self.revision.is_empty() {
            return Err("revision reference cannot be empty".to_string());
        }
        if self.stages.is_empty() {
            return Err("pipeline must declare at least one stage".to_string());
        }
        if self.run_timeout.is_zero() {
            return Err("run timeout must be greater than 0".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for stage in &self.stages {
            if stage.timeout.is_zero() {
                return Err(format!("stage '{}' has a zero timeout", stage.name));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(format!("duplicate stage name '{}'", stage.name));
            }
        }
        Ok(())
    }
}

/// Specification of one ordered unit of pipeline work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    pub kind: StageKind,
    pub timeout: Duration,
    /// Failure of a best-effort stage is recorded but does not fail the run
    pub best_effort: bool,
}

impl StageSpec {
    /// Creates a stage with the default timeout
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            timeout: DEFAULT_STAGE_TIMEOUT,
            best_effort: false,
        }
    }
}

/// What a stage does when the engine reaches it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageKind {
    /// Check the revision out into the run's workspace
    Checkout,
    /// Build an artifact from the workspace
    Build,
    /// Run the test command inside the built environment
    Test,
    /// Run an arbitrary command in the workspace
    Custom { command: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline_shape() {
        let spec = PipelineSpec::new("https://example.com/app.git", "abc123");
        let names: Vec<&str> = spec.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["checkout", "build", "test"]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let spec = PipelineSpec::new("r", "abc123")
            .with_test_command("pytest -q")
            .with_stage_timeout(Duration::from_secs(60))
            .with_best_effort_stage("lint", "ruff check .");

        assert_eq!(spec.test_command, "pytest -q");
        assert!(spec.stages.iter().all(|s| s.timeout == Duration::from_secs(60) || s.name == "lint"));
        let lint = spec.stages.last().unwrap();
        assert!(lint.best_effort);
        assert!(matches!(lint.kind, StageKind::Custom { .. }));
    }

    #[test]
    fn test_validation_rejects_empty_revision() {
        let spec = PipelineSpec::new("r", "");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_stage_names() {
        let mut spec = PipelineSpec::new("r", "abc123");
        spec.stages.push(StageSpec::new("build", StageKind::Custom { command: "true".into() }));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        let spec = PipelineSpec::new("r", "abc123").with_stage_timeout(Duration::ZERO);
        assert!(spec.validate().is_err());

        let spec = PipelineSpec::new("r", "abc123").with_run_timeout(Duration::ZERO);
        assert!(spec.validate().is_err());
    }
}
