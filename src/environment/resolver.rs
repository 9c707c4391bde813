//! Environment resolution
//!
//! Turns raw configuration entries or a command-line override string into a
//! validated, deduplicated, ordered set of environment descriptors.

use std::collections::HashSet;

use thiserror::Error;
use tracing::info;

use super::{BrowserKind, ColorScheme, EnvironmentConfig, EnvironmentDescriptor};

/// Environments in an override string are separated by ';', tokens within
/// one environment by ','
const ENVS_SPLITTER: char = ';';
const TOKENS_SPLITTER: char = ',';

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("unexpected environment token '{0}'")]
    UnexpectedToken(String),

    #[error("unknown browser kind '{0}'")]
    UnknownBrowser(String),

    #[error("unknown rendering scheme '{0}'")]
    UnknownScheme(String),

    #[error("interactive environment may not carry {0}")]
    IllegalCombination(&'static str),

    #[error("at least one environment descriptor is required")]
    EmptyBatch,
}

impl ResolveError {
    /// Distinguishes illegal combinations from malformed input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ResolveError::IllegalCombination(_) | ResolveError::EmptyBatch
        )
    }
}

pub struct EnvironmentResolver;

impl EnvironmentResolver {
    /// Resolve the effective environment set. An override string wins over
    /// configuration entries; with neither, a single interactive descriptor
    /// is assumed.
    pub fn resolve(
        configs: Option<&[EnvironmentConfig]>,
        override_tokens: Option<&str>,
    ) -> Result<Vec<EnvironmentDescriptor>, ResolveError> {
        let mut environments = match (override_tokens, configs) {
            (Some(tokens), _) => Self::parse_override(tokens)?,
            (None, Some(configs)) => configs
                .iter()
                .map(Self::from_config)
                .collect::<Result<Vec<_>, _>>()?,
            (None, None) => vec![EnvironmentDescriptor::interactive()],
        };

        if environments.is_empty() {
            return Err(ResolveError::EmptyBatch);
        }
        Self::validate(&environments)?;
        Self::dedupe(&mut environments);
        Ok(environments)
    }

    fn parse_override(tokens: &str) -> Result<Vec<EnvironmentDescriptor>, ResolveError> {
        let mut environments = Vec::new();
        for segment in tokens.split(ENVS_SPLITTER) {
            if segment.trim().is_empty() {
                continue;
            }
            let mut descriptor = EnvironmentDescriptor::interactive();
            for token in segment.split(TOKENS_SPLITTER) {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if token.eq_ignore_ascii_case("interactive") {
                    descriptor.interactive = true;
                } else if let Some(browser) = BrowserKind::from_str(token) {
                    descriptor.interactive = false;
                    descriptor.browser = Some(browser);
                } else if let Some(scheme) = ColorScheme::from_str(token) {
                    descriptor.scheme = Some(scheme);
                } else {
                    return Err(ResolveError::UnexpectedToken(token.to_string()));
                }
            }
            environments.push(descriptor);
        }
        Ok(environments)
    }

    fn from_config(config: &EnvironmentConfig) -> Result<EnvironmentDescriptor, ResolveError> {
        let browser = match &config.browser {
            Some(raw) => Some(
                BrowserKind::from_str(raw)
                    .ok_or_else(|| ResolveError::UnknownBrowser(raw.clone()))?,
            ),
            None => None,
        };
        let scheme = match &config.scheme {
            Some(raw) => Some(
                ColorScheme::from_str(raw)
                    .ok_or_else(|| ResolveError::UnknownScheme(raw.clone()))?,
            ),
            None => None,
        };
        Ok(EnvironmentDescriptor {
            interactive: config.interactive.unwrap_or(browser.is_none()),
            browser,
            device: config.device.clone(),
            scheme,
        })
    }

    /// Fail fast on the first illegal combination; the whole batch is rejected
    fn validate(environments: &[EnvironmentDescriptor]) -> Result<(), ResolveError> {
        for env in environments {
            if env.interactive {
                if env.browser.is_some() {
                    return Err(ResolveError::IllegalCombination("a browser kind"));
                }
                if env.device.is_some() {
                    return Err(ResolveError::IllegalCombination("a device profile"));
                }
                if env.scheme.is_some() {
                    return Err(ResolveError::IllegalCombination("a rendering scheme"));
                }
            }
        }
        Ok(())
    }

    /// Drop structural duplicates in place, keeping first occurrences
    fn dedupe(environments: &mut Vec<EnvironmentDescriptor>) {
        let mut seen: HashSet<EnvironmentDescriptor> = HashSet::new();
        environments.retain(|env| {
            if seen.contains(env) {
                info!("removing duplicate environment '{env}'");
                false
            } else {
                seen.insert(env.clone());
                true
            }
        });
    }
}
