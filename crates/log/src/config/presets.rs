//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Fields, Format};

impl Config {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // KEYWARD_LOG wins over RUST_LOG
        if let Ok(level) = std::env::var("KEYWARD_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }

        if let Ok(format) = std::env::var("KEYWARD_LOG_FORMAT") {
            config.format = format.parse().unwrap_or_default();
        }

        if std::env::var_os("NO_COLOR").is_some() {
            config.display.colors = false;
        }

        config.fields = Fields::from_env();
        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                target: true,
                flatten: true,
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_is_json_without_colors() {
        let config = Config::production();
        assert_eq!(config.format, Format::Json);
        assert!(!config.display.colors);
        assert!(config.display.flatten);
    }

    #[test]
    fn development_is_verbose() {
        let config = Config::development();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, Format::Pretty);
        assert!(config.display.source);
    }
}
