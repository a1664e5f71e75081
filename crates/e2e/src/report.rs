//! Test outcomes and the JSON results file

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::E2eResult;

pub const RESULTS_FILE: &str = "test-results.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    /// Not run because the group fixture could not be set up
    Skipped,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl TestOutcome {
    pub fn success(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Result of running a test group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    /// Set when the group fixture failed to start
    pub setup_error: Option<String>,
    pub results: Vec<TestOutcome>,
}

impl SuiteReport {
    pub fn new(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        setup_error: Option<String>,
        results: Vec<TestOutcome>,
    ) -> Self {
        let count = |status| results.iter().filter(|r| r.status == status).count();
        Self {
            name: name.into(),
            started_at,
            total: results.len(),
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            duration_ms,
            setup_error,
            results,
        }
    }

    /// True only if something ran and nothing failed or was skipped
    /// At least one test ran and every test passed
    pub fn success(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(TestOutcome::success)
    }

    /// Write the report as pretty JSON into `dir`
    pub fn write_json(&self, dir: &Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join(RESULTS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, status: TestStatus) -> TestOutcome {
        TestOutcome {
            name: name.to_string(),
            status,
            duration_ms: 12,
            error: (status != TestStatus::Passed).then(|| "boom".to_string()),
            screenshot: None,
        }
    }

    #[test]
    fn counts_by_status() {
        let report = SuiteReport::new(
            "calendar_input",
            Utc::now(),
            40,
            None,
            vec![
                outcome("a", TestStatus::Passed),
                outcome("b", TestStatus::Failed),
                outcome("c", TestStatus::Passed),
            ],
        );

        assert_eq!(report.total, 3);
        assert_eq!(report.passed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 0);
        assert!(!report.success());
    }

    #[test]
    fn all_passed_is_success() {
        let report = SuiteReport::new(
            "calendar_input",
            Utc::now(),
            40,
            None,
            vec![outcome("a", TestStatus::Passed), outcome("b", TestStatus::Passed)],
        );
        assert!(report.results.iter().all(TestOutcome::success));
        assert!(report.success());
    }

    #[test]
    fn skipped_or_empty_suite_is_not_success() {
        let skipped = SuiteReport::new(
            "calendar_input",
            Utc::now(),
            0,
            Some("startup timeout".to_string()),
            vec![outcome("a", TestStatus::Skipped)],
        );
        assert!(!skipped.success());

        let empty = SuiteReport::new("empty", Utc::now(), 0, None, vec![]);
        assert!(!empty.success());
    }

    #[test]
    fn writes_results_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = SuiteReport::new(
            "calendar_input",
            Utc::now(),
            5,
            None,
            vec![outcome("calendar_input_selection", TestStatus::Passed)],
        );

        let path = report.write_json(&dir.path().join("nested")).unwrap();
        assert_eq!(path.file_name().unwrap(), RESULTS_FILE);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["name"], "calendar_input");
        assert_eq!(json["passed"], 1);
        assert_eq!(json["results"][0]["status"], "passed");
    }
}
