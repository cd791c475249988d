//! Pipeline run domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One end-to-end execution of the staged sequence
///
/// Structure shared between the engine (owns and mutates) and the
/// repository (persists terminal records). Run identifiers are never
/// reused; re-triggering the same revision creates a new run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub repo: String,
    pub revision: String,
    pub status: RunStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub stages: Vec<StageRecord>,
    pub summary: Option<crate::domain::report::ReportSummary>,
}

impl PipelineRun {
    /// Creates a new pending run for a revision
    pub fn new(repo: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            repo: repo.into(),
            revision: revision.into(),
            status: RunStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            finished_at: None,
            stages: Vec::new(),
            summary: None,
        }
    }

    /// Returns the record for a stage by name, if recorded
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Aborted,
}

impl RunStatus {
    /// Whether the run has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }

    /// CLI exit code for a terminal status
    ///
    /// 0 = Succeeded, 1 = Failed, 2 = Aborted. Non-terminal statuses map
    /// to 3 since observing them at exit means the engine lost the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Failed => 1,
            Self::Aborted => 2,
            Self::Pending | Self::Running => 3,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}

/// Execution record of a single stage within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Tail of captured stdout/stderr, bounded by the engine
    pub output_tail: Option<String>,
    /// Error description when the stage did not succeed
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a pending record for a named stage
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            output_tail: None,
            error: None,
        }
    }
}

/// Stage execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Not executed because a predecessor failed or the run was aborted
    Skipped,
    Aborted,
}

impl StageStatus {
    /// Whether the stage has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", s)
    }
}
