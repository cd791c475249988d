//! Run DTOs for the trigger and report interfaces

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::report::ReportSummary;
use crate::domain::run::{PipelineRun, RunStatus, StageRecord};
use crate::domain::stage::PipelineSpec;

/// Request to trigger a new pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub repo: String,
    pub revision: String,
    #[serde(default)]
    pub overrides: StageOverrides,
}

impl TriggerRequest {
    pub fn new(repo: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
            overrides: StageOverrides::default(),
        }
    }

    /// Builds the pipeline specification this request describes
    pub fn into_spec(self) -> PipelineSpec {
        let mut spec = PipelineSpec::new(self.repo, self.revision);
        if let Some(cmd) = self.overrides.test_command {
            spec = spec.with_test_command(cmd);
        }
        if let Some(file) = self.overrides.build_file {
            spec = spec.with_build_file(file);
        }
        if let Some(timeout) = self.overrides.stage_timeout {
            spec = spec.with_stage_timeout(timeout);
        }
        if let Some(timeout) = self.overrides.run_timeout {
            spec = spec.with_run_timeout(timeout);
        }
        for (name, command) in self.overrides.best_effort_stages {
            spec = spec.with_best_effort_stage(name, command);
        }
        spec
    }
}

/// Optional per-trigger overrides of the default pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOverrides {
    #[serde(default)]
    pub test_command: Option<String>,
    #[serde(default)]
    pub build_file: Option<String>,
    #[serde(default)]
    pub stage_timeout: Option<Duration>,
    #[serde(default)]
    pub run_timeout: Option<Duration>,
    /// Extra (name, command) stages appended after test; failures recorded
    /// but never fatal
    #[serde(default)]
    pub best_effort_stages: Vec<(String, String)>,
}

/// Snapshot of a run for the report interface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunView {
    pub id: Uuid,
    pub repo: String,
    pub revision: String,
    pub status: RunStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub stages: Vec<StageRecord>,
    /// Present once the run is terminal and a report was produced
    pub summary: Option<ReportSummary>,
}

impl From<&PipelineRun> for RunView {
    fn from(run: &PipelineRun) -> Self {
        Self {
            id: run.id,
            repo: run.repo.clone(),
            revision: run.revision.clone(),
            status: run.status,
            created_at: run.created_at,
            finished_at: run.finished_at,
            stages: run.stages.clone(),
            summary: run.summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_overrides_flow_into_spec() {
        let mut req = TriggerRequest::new("https://example.com/app.git", "abc123");
        req.overrides.test_command = Some("pytest -q".to_string());
        req.overrides.stage_timeout = Some(Duration::from_secs(60));
        req.overrides
            .best_effort_stages
            .push(("lint".to_string(), "ruff check .".to_string()));

        let spec = req.into_spec();
        assert_eq!(spec.test_command, "pytest -q");
        assert_eq!(spec.stages.len(), 4);
        assert!(spec.stages[3].best_effort);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_run_view_from_run() {
        let run = PipelineRun::new("r", "abc123");
        let view = RunView::from(&run);
        assert_eq!(view.id, run.id);
        assert_eq!(view.status, RunStatus::Pending);
        assert!(view.summary.is_none());
    }
}
