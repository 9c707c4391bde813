//! Execution environments
//!
//! Where tests run: the already-open interactive surface, or an automated
//! browser instance of a given kind. Raw configuration is resolved into
//! validated descriptors, which the launcher turns into live handles.

mod automation;
mod launcher;
mod resolver;

pub use automation::{BrowserAutomation, BrowserSession, RemoteAutomation};
pub use launcher::{EnvironmentHandle, EnvironmentLauncher, LaunchError};
pub use resolver::{EnvironmentResolver, ResolveError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported automated browser kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }

    pub fn all() -> Vec<BrowserKind> {
        vec![BrowserKind::Chromium, BrowserKind::Firefox, BrowserKind::Webkit]
    }

    pub fn from_str(s: &str) -> Option<BrowserKind> {
        match s.to_lowercase().as_str() {
            "chromium" => Some(BrowserKind::Chromium),
            "firefox" => Some(BrowserKind::Firefox),
            "webkit" => Some(BrowserKind::Webkit),
            _ => None,
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Rendering color scheme requested from an automated browser
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub fn name(&self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }

    pub fn all() -> Vec<ColorScheme> {
        vec![ColorScheme::Light, ColorScheme::Dark]
    }

    pub fn from_str(s: &str) -> Option<ColorScheme> {
        match s.to_lowercase().as_str() {
            "light" => Some(ColorScheme::Light),
            "dark" => Some(ColorScheme::Dark),
            _ => None,
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Raw environment entry as written in a configuration file
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

impl From<&EnvironmentDescriptor> for EnvironmentConfig {
    fn from(descriptor: &EnvironmentDescriptor) -> Self {
        Self {
            interactive: Some(descriptor.interactive),
            browser: descriptor.browser.map(|b| b.to_string()),
            device: descriptor.device.clone(),
            scheme: descriptor.scheme.map(|s| s.to_string()),
        }
    }
}

/// A validated, immutable environment description
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDescriptor {
    pub interactive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<ColorScheme>,
}

impl EnvironmentDescriptor {
    pub fn interactive() -> Self {
        Self {
            interactive: true,
            browser: None,
            device: None,
            scheme: None,
        }
    }

    pub fn browser(kind: BrowserKind) -> Self {
        Self {
            interactive: false,
            browser: Some(kind),
            device: None,
            scheme: None,
        }
    }

    pub fn with_scheme(mut self, scheme: ColorScheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Short label used in logs and result attribution
    pub fn label(&self) -> String {
        if self.interactive {
            return "interactive".to_string();
        }
        let mut parts: Vec<String> = Vec::new();
        if let Some(browser) = self.browser {
            parts.push(browser.to_string());
        }
        if let Some(scheme) = self.scheme {
            parts.push(scheme.to_string());
        }
        if let Some(device) = &self.device {
            parts.push(device.clone());
        }
        if parts.is_empty() {
            parts.push("automated".to_string());
        }
        parts.join("-")
    }
}

impl fmt::Display for EnvironmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_kind_parsing() {
        assert_eq!(BrowserKind::from_str("Chromium"), Some(BrowserKind::Chromium));
        assert_eq!(BrowserKind::from_str("webkit"), Some(BrowserKind::Webkit));
        assert_eq!(BrowserKind::from_str("ie11"), None);
        assert_eq!(BrowserKind::all().len(), 3);
    }

    #[test]
    fn descriptor_labels() {
        assert_eq!(EnvironmentDescriptor::interactive().label(), "interactive");
        assert_eq!(
            EnvironmentDescriptor::browser(BrowserKind::Firefox)
                .with_scheme(ColorScheme::Dark)
                .label(),
            "firefox-dark"
        );
    }

    #[test]
    fn config_rejects_unknown_keys() {
        let raw = r#"{"browser": "chromium", "headless": true}"#;
        assert!(serde_json::from_str::<EnvironmentConfig>(raw).is_err());
    }

    #[test]
    fn descriptor_wire_shape() {
        let descriptor = EnvironmentDescriptor::browser(BrowserKind::Chromium)
            .with_scheme(ColorScheme::Dark);
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["interactive"], false);
        assert_eq!(json["browser"], "chromium");
        assert_eq!(json["scheme"], "dark");
    }
}
