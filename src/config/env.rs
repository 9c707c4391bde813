//! Environment variable configuration
//!
//! Provides TESTDECK_* environment variable overrides for configuration.

use std::env;

use super::{split_list, AppConfig};

/// Environment variable prefix
const ENV_PREFIX: &str = "TESTDECK";

/// Configuration overrides from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvOverrides {
    /// Orchestrator URL from TESTDECK_SERVER
    pub server_url: Option<String>,
    /// Automation service URL from TESTDECK_AUTOMATION
    pub automation_url: Option<String>,
    /// Session budget in seconds from TESTDECK_TTL
    pub session_ttl: Option<u64>,
    /// Result polling cadence in milliseconds from TESTDECK_POLL_INTERVAL
    pub poll_interval: Option<u64>,
    /// Environment override tokens from TESTDECK_ENVS
    pub environments: Option<String>,
    /// Reports directory from TESTDECK_REPORTS
    pub reports_folder: Option<String>,
    /// Report formats from TESTDECK_FORMATS
    pub formats: Option<String>,
    /// Configuration file from TESTDECK_CONFIG
    pub config_file: Option<String>,
    /// Log level from TESTDECK_LOG_LEVEL
    pub log_level: Option<String>,
    /// Color suppression from TESTDECK_NO_COLOR
    pub no_color: Option<bool>,
}

impl EnvOverrides {
    /// Load overrides from environment variables
    pub fn load() -> Self {
        Self {
            server_url: get_env("SERVER"),
            automation_url: get_env("AUTOMATION"),
            session_ttl: get_env_parse("TTL"),
            poll_interval: get_env_parse("POLL_INTERVAL"),
            environments: get_env("ENVS"),
            reports_folder: get_env("REPORTS"),
            formats: get_env("FORMATS"),
            config_file: get_env("CONFIG"),
            log_level: get_env("LOG_LEVEL"),
            no_color: get_env_bool("NO_COLOR"),
        }
    }

    /// Check if any overrides are set
    pub fn has_any(&self) -> bool {
        self.server_url.is_some()
            || self.automation_url.is_some()
            || self.session_ttl.is_some()
            || self.poll_interval.is_some()
            || self.environments.is_some()
            || self.reports_folder.is_some()
            || self.formats.is_some()
            || self.config_file.is_some()
            || self.log_level.is_some()
            || self.no_color.is_some()
    }

    /// Print current override values
    pub fn print_summary(&self) {
        println!("Environment Overrides:");
        println!("  {}_SERVER:         {:?}", ENV_PREFIX, self.server_url);
        println!("  {}_AUTOMATION:     {:?}", ENV_PREFIX, self.automation_url);
        println!("  {}_TTL:            {:?}", ENV_PREFIX, self.session_ttl);
        println!("  {}_POLL_INTERVAL:  {:?}", ENV_PREFIX, self.poll_interval);
        println!("  {}_ENVS:           {:?}", ENV_PREFIX, self.environments);
        println!("  {}_REPORTS:        {:?}", ENV_PREFIX, self.reports_folder);
        println!("  {}_FORMATS:        {:?}", ENV_PREFIX, self.formats);
        println!("  {}_CONFIG:         {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_LOG_LEVEL:      {:?}", ENV_PREFIX, self.log_level);
        println!("  {}_NO_COLOR:       {:?}", ENV_PREFIX, self.no_color);
    }

    /// Overlay the overrides onto a configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.server_url {
            config.server.url = url.clone();
        }
        if let Some(url) = &self.automation_url {
            config.server.automation_url = url.clone();
        }
        if let Some(ttl) = self.session_ttl {
            config.session.ttl_seconds = ttl;
        }
        if let Some(interval) = self.poll_interval {
            config.session.poll_interval_ms = interval;
        }
        if let Some(folder) = &self.reports_folder {
            config.reports.folder = folder.clone();
        }
        if let Some(formats) = &self.formats {
            config.reports.formats = split_list(formats);
        }
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    /// Create a new environment builder
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set orchestrator URL
    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_SERVER"), url.into()));
        self
    }

    /// Set automation service URL
    pub fn automation(mut self, url: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_AUTOMATION"), url.into()));
        self
    }

    /// Set session budget in seconds
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_TTL"), seconds.to_string()));
        self
    }

    /// Set result polling cadence in milliseconds
    pub fn poll_interval(mut self, millis: u64) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_POLL_INTERVAL"), millis.to_string()));
        self
    }

    /// Set environment override tokens
    pub fn envs(mut self, tokens: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_ENVS"), tokens.into()));
        self
    }

    /// Set reports directory
    pub fn reports(mut self, folder: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_REPORTS"), folder.into()));
        self
    }

    /// Set report formats
    pub fn formats(mut self, formats: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_FORMATS"), formats.into()));
        self
    }

    /// Set color suppression
    pub fn no_color(mut self, on: bool) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_NO_COLOR"), on.to_string()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all TESTDECK environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_SERVER         Orchestrator base URL");
    println!("  {ENV_PREFIX}_AUTOMATION     Browser automation service base URL");
    println!("  {ENV_PREFIX}_TTL            Session time budget in seconds");
    println!("  {ENV_PREFIX}_POLL_INTERVAL  Result polling cadence in milliseconds");
    println!("  {ENV_PREFIX}_ENVS           Environment tokens (e.g. chromium,dark;firefox)");
    println!("  {ENV_PREFIX}_REPORTS        Reports directory");
    println!("  {ENV_PREFIX}_FORMATS        Report formats (xunit, lcov, json, csv)");
    println!("  {ENV_PREFIX}_CONFIG         Path to configuration file");
    println!("  {ENV_PREFIX}_LOG_LEVEL      Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_NO_COLOR       Disable colored output (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_SERVER=http://localhost:3000");
    println!("  export {ENV_PREFIX}_ENVS=chromium");
    println!("  testdeck run");
}
