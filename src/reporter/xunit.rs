//! xUnit XML encoding
//!
//! Renders a session result as the xUnit XML dialect CI systems consume:
//! one testsuite element per suite aggregate, fault details as error or
//! failure children, stack traces as element text.

use crate::models::{SessionResult, SuiteResult, TestResult, TestStatus};

pub fn encode(session: &SessionResult) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<testsuites>\n");
    for suite in &session.suites {
        encode_suite(&mut out, suite);
    }
    out.push_str("</testsuites>\n");
    out
}

fn encode_suite(out: &mut String, suite: &SuiteResult) {
    out.push_str(&format!(
        "\t<testsuite name=\"{}\" time=\"{:.3}\" tests=\"{}\" errors=\"{}\" failures=\"{}\" skip=\"{}\">\n",
        escape(&suite.name),
        suite.duration.unwrap_or(0.0) / 1000.0,
        suite.total,
        suite.errored,
        suite.failed,
        suite.skipped
    ));
    for test in &suite.tests {
        encode_test(out, test);
    }
    out.push_str("\t</testsuite>\n");
}

fn encode_test(out: &mut String, test: &TestResult) {
    let name = escape(&test.name);
    let time = test.duration.unwrap_or(0.0) / 1000.0;

    match test.status {
        TestStatus::Failed | TestStatus::Errored => {
            let tag = if test.status == TestStatus::Failed {
                "failure"
            } else {
                "error"
            };
            out.push_str(&format!("\t\t<testcase name=\"{name}\" time=\"{time:.3}\">\n"));
            match &test.error {
                Some(fault) => {
                    out.push_str(&format!(
                        "\t\t\t<{tag} type=\"{}\" message=\"{}\">",
                        escape(&fault.kind),
                        escape(&fault.message)
                    ));
                    if let Some(stack) = &fault.stack {
                        out.push_str(&escape(stack));
                    }
                    out.push_str(&format!("</{tag}>\n"));
                }
                None => out.push_str(&format!("\t\t\t<{tag}/>\n")),
            }
            out.push_str("\t\t</testcase>\n");
        }
        TestStatus::Skipped => {
            out.push_str(&format!("\t\t<testcase name=\"{name}\" time=\"{time:.3}\">\n"));
            out.push_str("\t\t\t<skipped/>\n");
            out.push_str("\t\t</testcase>\n");
        }
        // passed, or still unsettled in a partial snapshot
        _ => out.push_str(&format!("\t\t<testcase name=\"{name}\" time=\"{time:.3}\"/>\n")),
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
