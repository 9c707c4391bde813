//! lcov encoding
//!
//! Converts collected coverage data into the lcov tracefile records
//! (TN/SF/DA/LF/LH, reference geninfo(1)). A line's execution count is the
//! maximum hit count across its covered ranges.

use crate::models::{CoverageData, FileCoverage};

use super::ReportError;

pub fn encode(coverage: &CoverageData) -> Result<String, ReportError> {
    validate(coverage)?;

    let mut records = Vec::with_capacity(coverage.tests.len());
    for test in &coverage.tests {
        let mut record = format!("TN:{}\n\n", test.test_name);
        for file in &test.coverage.files {
            encode_file(&mut record, file);
        }
        records.push(record);
    }
    Ok(records.join("\n"))
}

fn encode_file(record: &mut String, file: &FileCoverage) {
    record.push_str(&format!("SF:{}\n", file.path));

    let mut hit_lines = 0;
    for line in &file.lines {
        let max_hits = line.max_hits();
        record.push_str(&format!("DA:{},{max_hits}\n", line.number));
        if max_hits > 0 {
            hit_lines += 1;
        }
    }

    record.push_str(&format!("LF:{}\n", file.lines.len()));
    record.push_str(&format!("LH:{hit_lines}\n"));
    record.push_str("end_of_record\n");
}

fn validate(coverage: &CoverageData) -> Result<(), ReportError> {
    if coverage.tests.is_empty() {
        return Err(ReportError::InvalidCoverage(
            "no tests in coverage data".to_string(),
        ));
    }
    for test in &coverage.tests {
        if test.test_name.trim().is_empty() {
            return Err(ReportError::InvalidCoverage(
                "test with no name".to_string(),
            ));
        }
        if test.coverage.files.is_empty() {
            return Err(ReportError::InvalidCoverage(format!(
                "test '{}' carries no files",
                test.test_name
            )));
        }
        for file in &test.coverage.files {
            if file.path.trim().is_empty() {
                return Err(ReportError::InvalidCoverage(format!(
                    "file with no path under test '{}'",
                    test.test_name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CovRange, Coverage, LineCoverage, TestCoverage};

    fn line(number: u32, hits: &[u64]) -> LineCoverage {
        LineCoverage {
            number,
            beg: None,
            end: None,
            cov_ranges: hits
                .iter()
                .map(|&h| CovRange {
                    beg: None,
                    end: None,
                    hits: h,
                })
                .collect(),
        }
    }

    fn one_file_data() -> CoverageData {
        CoverageData {
            tests: vec![TestCoverage {
                test_name: "checkout.pays".to_string(),
                coverage: Coverage {
                    files: vec![FileCoverage {
                        path: "src/app.js".to_string(),
                        lines: vec![line(1, &[2, 3]), line(2, &[0])],
                    }],
                },
            }],
        }
    }

    #[test]
    fn takes_the_max_hit_count_per_line() {
        let report = encode(&one_file_data()).unwrap();
        assert!(report.starts_with("TN:checkout.pays\n"));
        assert!(report.contains("SF:src/app.js\nDA:1,3\nDA:2,0\nLF:2\nLH:1\nend_of_record\n"));
    }

    #[test]
    fn rejects_empty_and_pathless_input() {
        let err = encode(&CoverageData { tests: vec![] }).unwrap_err();
        assert!(matches!(err, ReportError::InvalidCoverage(_)));

        let mut data = one_file_data();
        data.tests[0].coverage.files[0].path = String::new();
        let err = encode(&data).unwrap_err();
        assert!(matches!(err, ReportError::InvalidCoverage(_)));
    }

    #[test]
    fn records_are_separated_per_test() {
        let mut data = one_file_data();
        data.tests.push(TestCoverage {
            test_name: "checkout.refunds".to_string(),
            coverage: Coverage {
                files: vec![FileCoverage {
                    path: "src/refund.js".to_string(),
                    lines: vec![line(1, &[1])],
                }],
            },
        });

        let report = encode(&data).unwrap();
        assert!(report.contains("TN:checkout.pays"));
        assert!(report.contains("TN:checkout.refunds"));
        assert!(report.contains("SF:src/refund.js\nDA:1,1\nLF:1\nLH:1\nend_of_record\n"));
    }
}
