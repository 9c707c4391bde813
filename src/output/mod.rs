//! Output formatting module
//!
//! Console rendering of session results.

use crate::models::{SessionResult, SuiteResult, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Session result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a full session result
    pub fn format_session(&self, session: &SessionResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_session_table(session),
            OutputFormat::Json => serde_json::to_string(session).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(session).unwrap_or_default(),
            OutputFormat::Summary => self.format_session_brief(session),
        }
    }

    fn format_session_table(&self, session: &SessionResult) -> String {
        let mut output = String::new();

        output.push_str("\n┌──────────────────────┬──────────────────┬───────┬───────┬───────┬───────┬───────┬────────────┐\n");
        output.push_str(&format!(
            "│ {:20} │ {:16} │ {:>5} │ {:>5} │ {:>5} │ {:>5} │ {:>5} │ {:>10} │\n",
            "Suite", "Environment", "Total", "Pass", "Fail", "Error", "Skip", "Duration"
        ));
        output.push_str("├──────────────────────┼──────────────────┼───────┼───────┼───────┼───────┼───────┼────────────┤\n");

        for suite in &session.suites {
            output.push_str(&self.format_suite_row(suite));
        }

        output.push_str("└──────────────────────┴──────────────────┴───────┴───────┴───────┴───────┴───────┴────────────┘\n");

        output.push_str(&format!(
            " Session #{} | {} | Duration: {:.1}ms\n",
            session.session_id, session.totals, session.duration
        ));

        if session.timed_out {
            let note = " session timed out before completion\n";
            if self.colorize {
                output.push_str(&format!("\x1b[33m{note}\x1b[0m"));
            } else {
                output.push_str(note);
            }
        }

        let broken: Vec<_> = session
            .suites
            .iter()
            .flat_map(|suite| {
                suite
                    .tests
                    .iter()
                    .filter(|test| {
                        matches!(test.status, TestStatus::Failed | TestStatus::Errored)
                    })
                    .map(move |test| (suite, test))
            })
            .collect();
        if !broken.is_empty() {
            output.push_str("\n Broken tests:\n");
            for (suite, test) in &broken {
                let detail = test
                    .error
                    .as_ref()
                    .map(|fault| format!(": {}", fault.message))
                    .unwrap_or_default();
                output.push_str(&format!(
                    "   {} {} :: {}{}\n",
                    test.status.symbol(),
                    suite.name,
                    test.name,
                    detail
                ));
            }
        }

        output
    }

    fn format_suite_row(&self, suite: &SuiteResult) -> String {
        let duration = suite
            .duration
            .map(|d| format!("{d:.1}ms"))
            .unwrap_or_else(|| "-".to_string());

        let passed = format!("{:>5}", suite.passed);
        let passed = if self.colorize && suite.passed > 0 {
            format!("\x1b[32m{passed}\x1b[0m")
        } else {
            passed
        };
        let failed = format!("{:>5}", suite.failed);
        let failed = if self.colorize && suite.failed > 0 {
            format!("\x1b[31m{failed}\x1b[0m")
        } else {
            failed
        };
        let errored = format!("{:>5}", suite.errored);
        let errored = if self.colorize && suite.errored > 0 {
            format!("\x1b[31m{errored}\x1b[0m")
        } else {
            errored
        };

        format!(
            "│ {:20} │ {:16} │ {:>5} │ {} │ {} │ {} │ {:>5} │ {:>10} │\n",
            suite.name,
            suite.environment.as_deref().unwrap_or("-"),
            suite.total,
            passed,
            failed,
            errored,
            suite.skipped,
            duration
        )
    }

    fn format_session_brief(&self, session: &SessionResult) -> String {
        format!(
            "session #{}: {}/{} passed across {} suite/s in {:.1}ms{}",
            session.session_id,
            session.totals.passed,
            session.totals.tests,
            session.suites.len(),
            session.duration,
            if session.timed_out { " (timed out)" } else { "" }
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}
