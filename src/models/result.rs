//! Suite and session result models
//!
//! Aggregates produced by the orchestration engine and consumed by reporters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::test::{TestFault, TestStatus};

/// One test's entry in a suite aggregate
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestFault>,
}

/// Aggregate of one suite under one environment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteResult {
    pub name: String,
    /// Label of the environment that produced this aggregate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub total: usize,
    pub done: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
    /// Milliseconds; only present once the suite completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub tests: Vec<TestResult>,
}

impl SuiteResult {
    pub fn new(name: impl Into<String>, tests: Vec<TestResult>) -> Self {
        let total = tests.len();
        let done = tests.iter().filter(|t| t.status.is_terminal()).count();
        let passed = tests
            .iter()
            .filter(|t| t.status == TestStatus::Passed)
            .count();
        let failed = tests
            .iter()
            .filter(|t| t.status == TestStatus::Failed)
            .count();
        let errored = tests
            .iter()
            .filter(|t| t.status == TestStatus::Errored)
            .count();
        let skipped = tests
            .iter()
            .filter(|t| t.status == TestStatus::Skipped)
            .count();

        Self {
            name: name.into(),
            environment: None,
            total,
            done,
            passed,
            failed,
            errored,
            skipped,
            duration: None,
            tests,
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }
}

/// Totals across every suite of a session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl SessionTotals {
    pub fn from_suites(suites: &[SuiteResult]) -> Self {
        let mut totals = SessionTotals::default();
        for suite in suites {
            totals.tests += suite.total;
            totals.passed += suite.passed;
            totals.failed += suite.failed;
            totals.errored += suite.errored;
            totals.skipped += suite.skipped;
        }
        totals
    }
}

impl fmt::Display for SessionTotals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Error: {} | Skip: {}",
            self.tests, self.passed, self.failed, self.errored, self.skipped
        )
    }
}

/// Final outcome of one session across all environments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub session_id: u64,
    pub started_at: DateTime<Utc>,
    pub suites: Vec<SuiteResult>,
    pub totals: SessionTotals,
    /// Milliseconds from session start to finalization
    pub duration: f64,
    pub timed_out: bool,
}

impl SessionResult {
    pub fn new(
        session_id: u64,
        started_at: DateTime<Utc>,
        suites: Vec<SuiteResult>,
        duration_ms: f64,
        timed_out: bool,
    ) -> Self {
        let totals = SessionTotals::from_suites(&suites);
        Self {
            session_id,
            started_at,
            suites,
            totals,
            duration: duration_ms,
            timed_out,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0 || self.totals.errored > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test::TestFault;

    fn sample_suite() -> SuiteResult {
        SuiteResult::new(
            "math",
            vec![
                TestResult {
                    name: "adds".to_string(),
                    status: TestStatus::Passed,
                    duration: Some(4.0),
                    error: None,
                },
                TestResult {
                    name: "divides".to_string(),
                    status: TestStatus::Errored,
                    duration: Some(1.0),
                    error: Some(TestFault::execution("division by zero")),
                },
                TestResult {
                    name: "rounds".to_string(),
                    status: TestStatus::Running,
                    duration: None,
                    error: None,
                },
            ],
        )
    }

    #[test]
    fn suite_counts() {
        let suite = sample_suite();
        assert_eq!(suite.total, 3);
        assert_eq!(suite.done, 2);
        assert_eq!(suite.passed, 1);
        assert_eq!(suite.errored, 1);
        assert_eq!(suite.failed, 0);
        assert!(!suite.is_clean());
    }

    #[test]
    fn session_totals() {
        let suites = vec![sample_suite(), sample_suite()];
        let totals = SessionTotals::from_suites(&suites);
        assert_eq!(totals.tests, 6);
        assert_eq!(totals.passed, 2);
        assert_eq!(totals.errored, 2);
    }

    #[test]
    fn session_wire_shape() {
        let result = SessionResult::new(7, Utc::now(), vec![sample_suite()], 120.5, true);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["sessionId"], 7);
        assert_eq!(json["timedOut"], true);
        assert_eq!(json["suites"][0]["name"], "math");
        assert!(result.has_failures());
    }
}
