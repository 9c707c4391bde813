//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// Test session orchestrator and local runner
#[derive(Parser, Debug)]
#[command(name = "testdeck")]
#[command(version = "0.1.0")]
#[command(about = "Run test sessions across browser and interactive environments")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a test session against an orchestrator server
    Run(RunArgs),

    /// Re-render a stored session result
    Report(ReportArgs),

    /// Resolve and list session environments
    Envs(EnvsArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Environment tokens, e.g. "chromium,dark;firefox"
    #[arg(short, long)]
    pub envs: Option<String>,

    /// Orchestrator base URL
    #[arg(short, long)]
    pub server: Option<String>,

    /// Session time budget in seconds
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Result polling cadence in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Reports directory
    #[arg(long)]
    pub reports: Option<String>,

    /// Report formats (comma-separated: xunit, lcov, json, csv)
    #[arg(long)]
    pub formats: Option<String>,

    /// Console output format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Dotted-path configuration overrides, e.g. session.ttlSeconds=600
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

/// Arguments for report command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Path to a session result JSON file
    pub input: String,

    /// Report format to emit (xunit, json, csv)
    #[arg(short, long, default_value = "xunit")]
    pub format: String,

    /// Reports directory
    #[arg(long, default_value = "reports")]
    pub reports: String,

    /// Report file name; a run id is generated when absent
    #[arg(long)]
    pub file_name: Option<String>,

    /// Print the rendered report instead of writing a file
    #[arg(long)]
    pub stdout: bool,
}

/// Arguments for envs command
#[derive(Parser, Debug)]
pub struct EnvsArgs {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Environment tokens to resolve instead of the configured ones
    #[arg(short, long)]
    pub envs: Option<String>,

    /// Print descriptors as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for config management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create an example configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./testdeck.yaml")]
        output: String,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show effective configuration
    Show {
        /// Show environment variable overrides instead
        #[arg(long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g. session.ttlSeconds)
        key: String,

        /// Value to set
        value: String,

        /// Configuration file to update
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Get a configuration value
    Get {
        /// Configuration key (e.g. session.ttlSeconds)
        key: String,

        /// Configuration file to read
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Show environment variable help
    Env,
}
