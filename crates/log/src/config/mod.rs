//! Logger configuration

mod presets;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filter directives in `EnvFilter` syntax (e.g. `info,keyward_database=debug`)
    pub level: String,
    /// Output format
    pub format: Format,
    /// Display toggles
    pub display: DisplayConfig,
    /// Whether the filter can be swapped at runtime via [`ReloadHandle`](crate::ReloadHandle)
    pub reloadable: bool,
    /// Global fields attached to a root span
    pub fields: Fields,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            display: DisplayConfig::default(),
            reloadable: false,
            fields: Fields::default(),
        }
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single-line
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

impl FromStr for Format {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LogError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Display toggles for the fmt layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// ANSI colours
    pub colors: bool,
    /// Source file and line number
    pub source: bool,
    /// Event target (module path)
    pub target: bool,
    /// Flatten event fields into the top-level JSON object
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            source: false,
            target: true,
            flatten: false,
        }
    }
}

/// Global fields recorded on the root span
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fields {
    /// Service name
    pub service: Option<String>,
    /// Deployment environment
    pub env: Option<String>,
    /// Service version
    pub version: Option<String>,
    /// Instance identifier
    pub instance: Option<String>,
}

impl Fields {
    /// Read fields from `KEYWARD_SERVICE`, `KEYWARD_ENV`, `KEYWARD_VERSION`, `KEYWARD_INSTANCE`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            service: std::env::var("KEYWARD_SERVICE").ok(),
            env: std::env::var("KEYWARD_ENV").ok(),
            version: std::env::var("KEYWARD_VERSION").ok(),
            instance: std::env::var("KEYWARD_INSTANCE").ok(),
        }
    }

    /// True when no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.service.is_none()
            && self.env.is_none()
            && self.version.is_none()
            && self.instance.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("pretty".parse::<Format>().unwrap(), Format::Pretty);
        assert_eq!("Compact".parse::<Format>().unwrap(), Format::Compact);
        assert!("logfmt".parse::<Format>().is_err());
    }

    #[test]
    fn empty_fields() {
        assert!(Fields::default().is_empty());
        let fields = Fields {
            service: Some("keyward".into()),
            ..Fields::default()
        };
        assert!(!fields.is_empty());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: Config = serde_json::from_str(r#"{"format":"json"}"#).unwrap();
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.level, "info");
        assert!(!config.reloadable);
    }
}
