//! Testdeck - Local Runner CLI
//!
//! Command line front end for running test sessions against an orchestrator
//! server, re-rendering stored session results and managing the layered
//! runner configuration.
//!
//! ## Features
//!
//! - Session runs across browser and interactive environments
//! - Environment selection via config file, TESTDECK_* variables or CLI tokens
//! - Console output as a table, JSON or a one-line summary
//! - Report generation in xUnit, lcov, JSON and CSV formats
//! - Layered configuration with dotted-path overrides
//!
//! ## Usage
//!
//! ```bash
//! # Run the configured session
//! testdeck run
//!
//! # Run against a specific server with two environments
//! testdeck run --server http://ci.local:3000 --envs "chromium,dark;firefox"
//!
//! # Re-render a stored session result as CSV
//! testdeck report results/session-4.json --format csv --stdout
//!
//! # List the environments a run would use
//! testdeck envs --envs "chromium;interactive"
//!
//! # Manage configuration
//! testdeck config init
//! testdeck config set session.ttlSeconds 600
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use testdeck::cli::{self, Args};
use testdeck::client::SessionClient;
use testdeck::config::{self, AppConfig, EnvOverrides};
use testdeck::environment::{EnvironmentConfig, EnvironmentResolver};
use testdeck::models::SessionResult;
use testdeck::output::{OutputFormat, ResultFormatter};
use testdeck::reporter::{self, ReportFormat};
use testdeck::utils::{init_logger, LogLevel, Timer};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = LogLevel::from_str(&args.log_level).unwrap_or(LogLevel::Info);
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            run_session(run_args).await?;
        }
        cli::Command::Report(report_args) => {
            render_report(report_args)?;
        }
        cli::Command::Envs(envs_args) => {
            list_environments(envs_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
    }

    Ok(())
}

async fn run_session(args: cli::RunArgs) -> Result<()> {
    let timer = Timer::start("session run");

    let overrides = EnvOverrides::load();
    let mut config = load_config(args.config.as_deref().or(overrides.config_file.as_deref()))?;
    overrides.apply(&mut config);

    if let Some(server) = args.server {
        config.server.url = server;
    }
    if let Some(ttl) = args.ttl {
        config.session.ttl_seconds = ttl;
    }
    if let Some(poll) = args.poll_interval {
        config.session.poll_interval_ms = poll;
    }
    if let Some(reports) = args.reports {
        config.reports.folder = reports;
    }
    if let Some(formats) = args.formats.as_deref() {
        config.apply_override("reports.formats", formats)?;
    }
    for entry in &args.overrides {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid override '{entry}', expected KEY=VALUE"))?;
        config.apply_override(key, value)?;
    }
    config.validate()?;

    let env_tokens = args.envs.or(overrides.environments);
    let configured = (!config.environments.is_empty()).then_some(config.environments.as_slice());
    let descriptors = EnvironmentResolver::resolve(configured, env_tokens.as_deref())?;

    // The posted configuration carries the resolved set so the orchestrator
    // schedules exactly the environments requested here.
    config.environments = descriptors.iter().map(EnvironmentConfig::from).collect();

    info!(
        "Running session across {} environment/s: {}",
        descriptors.len(),
        descriptors
            .iter()
            .map(|d| d.label())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let client = SessionClient::new(&config.server.url)?
        .with_poll_interval(config.session.poll_interval());

    let details = client.create_session(&config).await?;
    info!(
        "Session #{} created on {}",
        details.session_id,
        client.base_url()
    );

    // The orchestrator enforces the session budget itself. The doubled
    // client-side deadline only guards against a hung server.
    let deadline = config.session.ttl().saturating_mul(2);
    let result = client.wait_result(details.session_id, Some(deadline)).await?;

    let format = OutputFormat::from_str(&args.format).unwrap_or(OutputFormat::Table);
    let mut formatter = ResultFormatter::new(format);
    if args.no_color || overrides.no_color.unwrap_or(false) {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format_session(&result));

    write_reports(&config, &result)?;
    timer.stop();

    let broken = result.totals.failed + result.totals.errored > config.tests.max_fail as usize
        || result.totals.skipped > config.tests.max_skip as usize;
    if broken || result.timed_out {
        std::process::exit(1);
    }

    Ok(())
}

fn write_reports(config: &AppConfig, result: &SessionResult) -> Result<()> {
    for format in config.reports.resolved_formats()? {
        if format == ReportFormat::Lcov {
            warn!("skipping lcov report: no coverage data collected");
            continue;
        }

        let content = reporter::create_report(result, None, format)?;
        let name = config
            .reports
            .file_name
            .as_deref()
            .map(|base| per_format_name(base, format));
        let path =
            reporter::write_report(&content, &config.reports.folder, name.as_deref(), format)?;
        println!("✓ Report written to {}", path.display());
    }

    Ok(())
}

/// Keeps a fixed report file name usable across several formats
fn per_format_name(base: &str, format: ReportFormat) -> String {
    let stem = base.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(base);
    format!("{stem}.{}", format.extension())
}

fn render_report(args: cli::ReportArgs) -> Result<()> {
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read session result: {}", args.input))?;
    let session: SessionResult = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse session result: {}", args.input))?;

    let format = ReportFormat::from_str(&args.format)
        .ok_or_else(|| anyhow::anyhow!("Unknown report format: {}", args.format))?;

    let content = reporter::create_report(&session, None, format)?;
    if args.stdout {
        println!("{content}");
    } else {
        let path =
            reporter::write_report(&content, &args.reports, args.file_name.as_deref(), format)?;
        println!("✓ Report written to {}", path.display());
    }

    Ok(())
}

fn list_environments(args: cli::EnvsArgs) -> Result<()> {
    let overrides = EnvOverrides::load();
    let config = load_config(args.config.as_deref().or(overrides.config_file.as_deref()))?;

    let env_tokens = args.envs.or(overrides.environments);
    let configured = (!config.environments.is_empty()).then_some(config.environments.as_slice());
    let descriptors = EnvironmentResolver::resolve(configured, env_tokens.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
    } else {
        println!("Resolved environments:");
        for descriptor in &descriptors {
            println!("  - {descriptor}");
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    use std::path::Path;

    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            let config = AppConfig::example();
            config::file::save(&config, path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env, format } => {
            if env {
                let overrides = EnvOverrides::load();
                overrides.print_summary();
            } else {
                let config = config::file::load_default()?;
                let output = if format == "json" {
                    serde_json::to_string_pretty(&config)?
                } else {
                    serde_yaml::to_string(&config)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Validate { file } => {
            let path = file.unwrap_or_else(|| {
                config::file::find()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| "./testdeck.yaml".to_string())
            });

            match config::file::load(&path) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {path}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e}");
                    return Err(e.into());
                }
            }
        }

        cli::ConfigAction::Set { key, value, file } => {
            let path = file.unwrap_or_else(|| "./testdeck.yaml".to_string());
            let mut config = if Path::new(&path).exists() {
                config::file::load(&path)?
            } else {
                AppConfig::default()
            };

            config.apply_override(&key, &value)?;
            config.validate()?;
            config::file::save(&config, &path)?;
            println!("✓ Set {key} = {value} in {path}");
        }

        cli::ConfigAction::Get { key, file } => {
            let config = if let Some(path) = file {
                config::file::load(&path)?
            } else {
                config::file::load_default()?
            };

            println!("{}", config.value_of(&key)?);
        }

        cli::ConfigAction::Env => {
            config::env::print_env_help();
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => config::file::load(path)?,
        None => config::file::load_default()?,
    };
    Ok(config)
}
