//! Test report domain types
//!
//! A test suite reports outcomes as JSON Lines on stdout, one object per
//! outcome: `{"test": "...", "status": "passed", "duration_ms": 12,
//! "message": null}`. Lines that are not outcome objects (ordinary print
//! output) are ignored. A report is immutable once produced.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome status of a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

/// One recorded test outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    #[serde(rename = "test", alias = "name")]
    pub name: String,
    pub status: TestStatus,
    #[serde(rename = "duration_ms", default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Structured record of one test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub outcomes: Vec<TestOutcome>,
    /// Exit code of the test command; domain data, not an engine error
    pub exit_code: i32,
    /// Set when the output stream ended mid-record (e.g. the suite was
    /// killed by a timeout while writing)
    pub truncated: bool,
}

impl TestReport {
    /// Parses a report from captured stdout
    ///
    /// Tolerates interleaved non-JSON output and a truncated final record;
    /// truncation is recorded rather than treated as a parse failure.
    pub fn parse(stdout: &str, exit_code: i32) -> Self {
        let mut outcomes = Vec::new();
        let mut truncated = false;

        let lines: Vec<&str> = stdout.lines().collect();
        for (idx, line) in lines.iter().enumerate() {
            let line = line.trim();
            if !line.starts_with('{') {
                continue;
            }
            match serde_json::from_str::<TestOutcome>(line) {
                Ok(outcome) => outcomes.push(outcome),
                Err(_) => {
                    // A malformed record in the middle of the stream is noise;
                    // at the very end it means the writer was cut off.
                    if idx == lines.len() - 1 {
                        truncated = true;
                    }
                }
            }
        }

        Self {
            outcomes,
            exit_code,
            truncated,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Completeness of an aggregated summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Complete,
    /// The underlying report was truncated or malformed; counts cover only
    /// what was recovered
    Incomplete,
}

/// Aggregated pass/fail summary of a test report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub status: ReportStatus,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration: Duration,
    /// Names and messages of failing tests, in report order
    pub failures: Vec<(String, Option<String>)>,
}

impl ReportSummary {
    /// Total number of outcomes covered by the summary
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}
