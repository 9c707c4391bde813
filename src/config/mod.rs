//! Configuration module
//!
//! Builds the effective run configuration from defaults, a configuration
//! file, environment variables and command line overrides.

pub mod env;
pub mod file;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::environment::{BrowserKind, ColorScheme, EnvironmentConfig};
use crate::reporter::ReportFormat;
use crate::suite::{SuiteOptions, DEFAULT_PROBE_DELAY, DEFAULT_TEST_TTL};

pub use env::{EnvBuilder, EnvOverrides};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid configuration: {0}")]
    InvalidValue(String),
}

/// Effective application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct AppConfig {
    /// Orchestrator and automation service endpoints
    pub server: ServerConfig,

    /// Session level settings
    pub session: SessionConfig,

    /// Per-test defaults
    pub tests: TestsConfig,

    /// Environments the session executes against
    pub environments: Vec<EnvironmentConfig>,

    /// Report output settings
    pub reports: ReportsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            tests: TestsConfig::default(),
            environments: Vec::new(),
            reports: ReportsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate the configuration sections
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.session.validate()?;
        self.tests.validate()?;
        for entry in &self.environments {
            validate_environment_entry(entry)?;
        }
        self.reports.validate()?;
        Ok(())
    }

    /// Apply a single dotted-path command line override, e.g. `session.ttlSeconds=600`
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "server.url" => self.server.url = value.to_string(),
            "server.automationUrl" => self.server.automation_url = value.to_string(),
            "session.ttlSeconds" => self.session.ttl_seconds = parse_value(key, value)?,
            "session.pollIntervalMs" => self.session.poll_interval_ms = parse_value(key, value)?,
            "tests.ttlMs" => self.tests.ttl_ms = parse_value(key, value)?,
            "tests.probeDelayMs" => self.tests.probe_delay_ms = parse_value(key, value)?,
            "tests.maxFail" => self.tests.max_fail = parse_value(key, value)?,
            "tests.maxSkip" => self.tests.max_skip = parse_value(key, value)?,
            "reports.folder" => self.reports.folder = value.to_string(),
            "reports.formats" => self.reports.formats = split_list(value),
            "reports.fileName" => self.reports.file_name = Some(value.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Read a single dotted-path key back as a display string
    pub fn value_of(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "server.url" => self.server.url.clone(),
            "server.automationUrl" => self.server.automation_url.clone(),
            "session.ttlSeconds" => self.session.ttl_seconds.to_string(),
            "session.pollIntervalMs" => self.session.poll_interval_ms.to_string(),
            "tests.ttlMs" => self.tests.ttl_ms.to_string(),
            "tests.probeDelayMs" => self.tests.probe_delay_ms.to_string(),
            "tests.maxFail" => self.tests.max_fail.to_string(),
            "tests.maxSkip" => self.tests.max_skip.to_string(),
            "reports.folder" => self.reports.folder.clone(),
            "reports.formats" => self.reports.formats.join(","),
            "reports.fileName" => self.reports.file_name.clone().unwrap_or_default(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Generate example configuration
    pub fn example() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig {
                ttl_seconds: 120,
                poll_interval_ms: 1237,
            },
            tests: TestsConfig::default(),
            environments: vec![
                EnvironmentConfig {
                    browser: Some("chromium".to_string()),
                    scheme: Some("dark".to_string()),
                    ..Default::default()
                },
                EnvironmentConfig {
                    browser: Some("firefox".to_string()),
                    ..Default::default()
                },
            ],
            reports: ReportsConfig {
                folder: "reports".to_string(),
                formats: vec!["xunit".to_string(), "json".to_string()],
                file_name: None,
            },
        }
    }
}

/// Orchestrator and automation service endpoints
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerConfig {
    /// Base URL sessions are created against
    pub url: String,

    /// Base URL of the browser automation service
    pub automation_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            automation_url: "http://localhost:4444".to_string(),
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                r#""server" configuration is missing "url" part"#.to_string(),
            ));
        }
        if self.automation_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                r#""server" configuration is missing "automationUrl" part"#.to_string(),
            ));
        }
        Ok(())
    }
}

/// Session level settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionConfig {
    /// Overall session budget in seconds
    pub ttl_seconds: u64,

    /// Result polling cadence in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            poll_interval_ms: 1237,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                r#""ttlSeconds" configuration of "session" must be positive"#.to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                r#""pollIntervalMs" configuration of "session" must be positive"#.to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-test defaults
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct TestsConfig {
    /// Per-test time budget in milliseconds; 0 disables the timer
    pub ttl_ms: u64,

    /// Quiescence probing delay in milliseconds
    pub probe_delay_ms: u64,

    /// Failed tests tolerated before the run is considered broken
    pub max_fail: u32,

    /// Skipped tests tolerated before the run is considered broken
    pub max_skip: u32,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TEST_TTL.as_millis() as u64,
            probe_delay_ms: DEFAULT_PROBE_DELAY.as_millis() as u64,
            max_fail: 0,
            max_skip: 0,
        }
    }
}

impl TestsConfig {
    /// Suite options derived from these defaults
    pub fn suite_options(&self) -> SuiteOptions {
        SuiteOptions {
            skip: false,
            probe_delay: Duration::from_millis(self.probe_delay_ms),
            default_ttl: (self.ttl_ms > 0).then(|| Duration::from_millis(self.ttl_ms)),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_delay_ms == 0 {
            return Err(ConfigError::InvalidValue(
                r#""probeDelayMs" configuration of "tests" must be positive"#.to_string(),
            ));
        }
        Ok(())
    }
}

/// Report output settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportsConfig {
    /// Directory report files land under
    pub folder: String,

    /// Formats to emit
    pub formats: Vec<String>,

    /// Fixed report file name; a run id is generated when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            folder: "reports".to_string(),
            formats: vec!["xunit".to_string()],
            file_name: None,
        }
    }
}

impl ReportsConfig {
    /// Resolve the configured format names
    pub fn resolved_formats(&self) -> Result<Vec<ReportFormat>, ConfigError> {
        self.formats
            .iter()
            .map(|name| {
                ReportFormat::from_str(name).ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        r#"invalid "format" configuration of "reports": {name}; supported formats are: {}"#,
                        supported_formats()
                    ))
                })
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.folder.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                r#""reports" configuration is missing "folder" part"#.to_string(),
            ));
        }
        self.resolved_formats()?;
        Ok(())
    }
}

fn validate_environment_entry(entry: &EnvironmentConfig) -> Result<(), ConfigError> {
    if let Some(browser) = &entry.browser {
        if BrowserKind::from_str(browser).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                r#""browser" of "environments" entry is not one of the supported ones ({}): {browser}"#,
                supported_browsers()
            )));
        }
    }
    if let Some(scheme) = &entry.scheme {
        if ColorScheme::from_str(scheme).is_none() {
            return Err(ConfigError::InvalidValue(format!(
                r#""scheme" of "environments" entry is not one of the supported ones ({}): {scheme}"#,
                supported_schemes()
            )));
        }
    }
    Ok(())
}

fn supported_browsers() -> String {
    BrowserKind::all()
        .iter()
        .map(|kind| kind.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn supported_schemes() -> String {
    ColorScheme::all()
        .iter()
        .map(|scheme| scheme.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn supported_formats() -> String {
    ReportFormat::all()
        .iter()
        .map(|format| format.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("cannot parse '{value}' for key '{key}'")))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}
