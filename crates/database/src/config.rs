//! Backend and pool configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ttl::SystemView;

/// 32 days, the conventional system-wide lease ceiling.
const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(768 * 3600);

/// System lease policy.
///
/// Implements [`SystemView`] directly so a static configuration can stand in
/// for a mount-level policy source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// TTL applied when a role sets none
    #[serde(with = "humantime_serde")]
    pub default_lease_ttl: Duration,
    /// Upper bound for every lease
    #[serde(with = "humantime_serde")]
    pub max_lease_ttl: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            default_lease_ttl: DEFAULT_LEASE_TTL,
            max_lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

impl BackendConfig {
    /// Build from `KEYWARD_DEFAULT_LEASE_TTL` / `KEYWARD_MAX_LEASE_TTL`
    /// (humantime strings such as `1h` or `30m`), falling back to defaults.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] if a variable is set but unparsable
    /// or the resulting policy is invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(ttl) = env_duration("KEYWARD_DEFAULT_LEASE_TTL")? {
            config.default_lease_ttl = ttl;
        }
        if let Some(ttl) = env_duration("KEYWARD_MAX_LEASE_TTL")? {
            config.max_lease_ttl = ttl;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_lease_ttl.is_zero() {
            return Err(Error::configuration("max_lease_ttl must be greater than 0"));
        }
        if self.default_lease_ttl.is_zero() {
            return Err(Error::configuration(
                "default_lease_ttl must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl SystemView for BackendConfig {
    fn default_lease_ttl(&self) -> Duration {
        self.default_lease_ttl
    }

    fn max_lease_ttl(&self) -> Duration {
        self.max_lease_ttl
    }
}

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on opening (and verifying) a connection, on top of the
    /// request deadline
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::configuration(
                "connect_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    std::env::var(key)
        .ok()
        .map(|raw| {
            humantime::parse_duration(raw.trim())
                .map_err(|e| Error::configuration(format!("{key}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        BackendConfig::default().validate().unwrap();
        PoolConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_max_is_rejected() {
        let config = BackendConfig {
            max_lease_ttl: Duration::ZERO,
            ..BackendConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let config = PoolConfig {
            connect_timeout: Duration::ZERO,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserializes_humantime() {
        let raw = r#"{"default_lease_ttl":"1h","max_lease_ttl":"24h"}"#;
        let config: BackendConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.default_lease_ttl, Duration::from_secs(3600));
        assert_eq!(config.max_lease_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: PoolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PoolConfig::default());
    }
}
