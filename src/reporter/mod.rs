//! Report assembly
//!
//! Turns a session result (and optionally collected coverage) into an
//! external report and lands it under the reports directory.

mod lcov;
mod xunit;

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::models::{CoverageData, SessionResult};

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("unknown report format '{0}'")]
    UnknownFormat(String),

    #[error("invalid coverage data: {0}")]
    InvalidCoverage(String),

    #[error("failed to encode csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

/// Report format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportFormat {
    Xunit,
    Lcov,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn all() -> Vec<ReportFormat> {
        vec![
            ReportFormat::Xunit,
            ReportFormat::Lcov,
            ReportFormat::Json,
            ReportFormat::Csv,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            ReportFormat::Xunit => "xunit",
            ReportFormat::Lcov => "lcov",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "xunit" | "xml" => Some(ReportFormat::Xunit),
            "lcov" => Some(ReportFormat::Lcov),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    /// File extension the format conventionally lands under
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Xunit => "xml",
            ReportFormat::Lcov => "lcov",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }

    /// Derive a format from an output file name
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str())?.to_lowercase().as_str() {
            "xml" => Some(ReportFormat::Xunit),
            "lcov" | "info" => Some(ReportFormat::Lcov),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Render one report. Coverage data is only consulted by the lcov format.
pub fn create_report(
    session: &SessionResult,
    coverage: Option<&CoverageData>,
    format: ReportFormat,
) -> Result<String, ReportError> {
    match format {
        ReportFormat::Xunit => Ok(xunit::encode(session)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(session)?),
        ReportFormat::Csv => encode_csv(session),
        ReportFormat::Lcov => {
            let coverage = coverage.ok_or_else(|| {
                ReportError::InvalidCoverage("no coverage data collected".to_string())
            })?;
            lcov::encode(coverage)
        }
    }
}

/// One row per suite aggregate
fn encode_csv(session: &SessionResult) -> Result<String, ReportError> {
    let mut writer = csv::Writer::from_writer(vec![]);

    writer.write_record([
        "environment",
        "suite",
        "total",
        "done",
        "passed",
        "failed",
        "errored",
        "skipped",
        "duration_ms",
    ])?;
    for suite in &session.suites {
        writer.write_record([
            suite.environment.clone().unwrap_or_default(),
            suite.name.clone(),
            suite.total.to_string(),
            suite.done.to_string(),
            suite.passed.to_string(),
            suite.failed.to_string(),
            suite.errored.to_string(),
            suite.skipped.to_string(),
            suite
                .duration
                .map(|d| format!("{d:.1}"))
                .unwrap_or_default(),
        ])?;
    }
    writer.flush()?;

    let bytes = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Generate unique run ID
pub fn generate_run_id() -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let random: u32 = rand::random::<u32>() % 10000;
    format!("{timestamp}_{random:04}")
}

/// Write a rendered report under the reports directory, creating it on
/// demand; without a file name the artifact is named by a fresh run id.
pub fn write_report(
    content: &str,
    reports_dir: impl AsRef<Path>,
    file_name: Option<&str>,
    format: ReportFormat,
) -> Result<PathBuf, ReportError> {
    let dir = reports_dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let name = match file_name {
        Some(name) => name.to_string(),
        None => format!("{}.{}", generate_run_id(), format.extension()),
    };
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    info!("{} report written to {}", format, path.display());
    Ok(path)
}
