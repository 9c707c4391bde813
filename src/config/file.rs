//! Configuration file management
//!
//! Handles finding, loading and saving configuration files.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{AppConfig, ConfigError};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./testdeck.yaml",
    "./testdeck.yml",
    "./testdeck.json",
    "./.testdeck.yaml",
    "./.testdeck/config.yaml",
    "~/.config/testdeck/config.yaml",
    "~/.testdeck.yaml",
];

/// Find a configuration file in the standard locations
pub fn find() -> Option<PathBuf> {
    for location in CONFIG_LOCATIONS {
        let path = expand_path(location);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Load configuration from the first discovered location, falling back to defaults
pub fn load_default() -> Result<AppConfig, ConfigError> {
    match find() {
        Some(path) => {
            debug!("loading configuration from {}", path.display());
            load(&path)
        }
        None => Ok(AppConfig::default()),
    }
}

/// Load and validate configuration from a file, yaml or json by extension
pub fn load(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;

    let config: AppConfig = if is_yaml_file(path) {
        serde_yaml::from_str(&content).map_err(|e| parse_error(path, e.to_string()))?
    } else {
        serde_json::from_str(&content).map_err(|e| parse_error(path, e.to_string()))?
    };

    config.validate()?;
    Ok(config)
}

/// Save configuration to a file, yaml or json by extension
pub fn save(config: &AppConfig, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let path = path.as_ref();
    let content = if is_yaml_file(path) {
        serde_yaml::to_string(config)
            .map_err(|e| ConfigError::InvalidValue(format!("failed to serialize configuration: {e}")))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::InvalidValue(format!("failed to serialize configuration: {e}")))?
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
    }

    std::fs::write(path, content).map_err(|e| io_error(path, e))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn parse_error(path: &Path, message: String) -> ConfigError {
    match unknown_field(&message) {
        Some(field) => ConfigError::UnknownKey(field),
        None => ConfigError::Parse {
            path: path.display().to_string(),
            message,
        },
    }
}

/// Extract the offending name from a serde unknown-field message
fn unknown_field(message: &str) -> Option<String> {
    let rest = message.split("unknown field `").nth(1)?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
