//! Data models for session orchestration
//!
//! This module contains all data structures used throughout the application.

mod coverage;
mod messages;
mod result;

pub use coverage::{CovRange, Coverage, CoverageData, FileCoverage, LineCoverage, TestCoverage};
pub use messages::EnvMessage;
pub use result::{SessionResult, SessionTotals, SuiteResult, TestResult};
pub use test::{TestFault, TestMeta, TestMode, TestRun, TestStatus};
