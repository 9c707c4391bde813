//! Coverage data shapes
//!
//! Per-test line coverage as collected by an automated environment, consumed
//! by the lcov encoder.

use serde::{Deserialize, Serialize};

/// Coverage collected over one session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageData {
    pub tests: Vec<TestCoverage>,
}

/// Coverage attributed to one test
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCoverage {
    pub test_name: String,
    pub coverage: Coverage,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub files: Vec<FileCoverage>,
}

/// Line coverage of one source file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileCoverage {
    pub path: String,
    pub lines: Vec<LineCoverage>,
}

/// One coverable line with its covered character ranges
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineCoverage {
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beg: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
    #[serde(rename = "covRanges")]
    pub cov_ranges: Vec<CovRange>,
}

impl LineCoverage {
    /// Highest hit count across the line's ranges; 0 when never executed
    pub fn max_hits(&self) -> u64 {
        self.cov_ranges.iter().map(|r| r.hits).max().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beg: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
    pub hits: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_shape() {
        let raw = r#"{
            "tests": [{
                "testName": "lib.math",
                "coverage": {
                    "files": [{
                        "path": "/src/math.js",
                        "lines": [
                            {"number": 1, "covRanges": [{"hits": 3}]},
                            {"number": 2, "covRanges": [{"hits": 0}]}
                        ]
                    }]
                }
            }]
        }"#;
        let data: CoverageData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.tests.len(), 1);
        let file = &data.tests[0].coverage.files[0];
        assert_eq!(file.path, "/src/math.js");
        assert_eq!(file.lines[0].max_hits(), 3);
        assert_eq!(file.lines[1].max_hits(), 0);
    }

    #[test]
    fn max_hits_across_ranges() {
        let line = LineCoverage {
            number: 7,
            beg: Some(0),
            end: Some(40),
            cov_ranges: vec![
                CovRange {
                    beg: Some(0),
                    end: Some(20),
                    hits: 2,
                },
                CovRange {
                    beg: Some(20),
                    end: Some(40),
                    hits: 5,
                },
            ],
        };
        assert_eq!(line.max_hits(), 5);
    }
}
