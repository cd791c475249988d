//! Core domain types
//!
//! This module contains the core domain structures used across Anvil crates.
//! These types represent the fundamental business entities and are shared between
//! the engine (for execution and persistence) and the CLI (for rendering).

pub mod artifact;
pub mod report;
pub mod run;
pub mod stage;

pub use artifact::BuildArtifact;
pub use report::{ReportStatus, ReportSummary, TestOutcome, TestReport, TestStatus};
pub use run::{PipelineRun, RunStatus, StageRecord, StageStatus};
pub use stage::{PipelineSpec, StageKind, StageSpec};
