//! Report aggregation
//!
//! Folds a [`TestReport`] into the pass/fail summary exposed by the report
//! interface. Truncated reports degrade to `ReportStatus::Incomplete`
//! instead of failing: the counts then cover what was recovered.

use std::time::Duration;

use anvil_core::domain::{ReportStatus, ReportSummary, TestReport, TestStatus};

/// Summarizes a test report
pub fn summarize(report: &TestReport) -> ReportSummary {
    let mut passed = 0;
    let mut failed = 0;
    let mut skipped = 0;
    let mut total_ms = 0u64;
    let mut failures = Vec::new();

    for outcome in &report.outcomes {
        total_ms += outcome.duration_ms;
        match outcome.status {
            TestStatus::Passed => passed += 1,
            TestStatus::Failed => {
                failed += 1;
                failures.push((outcome.name.clone(), outcome.message.clone()));
            }
            TestStatus::Skipped => skipped += 1,
        }
    }

    let status = if report.truncated {
        ReportStatus::Incomplete
    } else {
        ReportStatus::Complete
    };

    ReportSummary {
        status,
        passed,
        failed,
        skipped,
        total_duration: Duration::from_millis(total_ms),
        failures,
    }
}
