//! Role and target configuration records

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Statement sets handed to the target when managing a principal.
///
/// The contents are opaque to this crate; each target plugin interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statements {
    /// Executed to create the principal
    pub creation: Vec<String>,
    /// Executed when the lease is revoked
    pub revocation: Vec<String>,
    /// Executed to undo a partially failed creation
    pub rollback: Vec<String>,
    /// Executed when the lease is renewed
    pub renewal: Vec<String>,
}

impl Statements {
    /// Statements with only a creation set
    pub fn creation<I, S>(statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            creation: statements.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// A named role that credentials are issued for.
///
/// A zero `default_ttl` or `max_ttl` means "unset": the system value applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name
    pub name: String,
    /// Name of the owning target
    pub db_name: String,
    /// Statements used to create and manage the principal
    #[serde(default)]
    pub statements: Statements,
    /// Role-level default lease TTL
    #[serde(default, with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Role-level maximum lease TTL
    #[serde(default, with = "humantime_serde")]
    pub max_ttl: Duration,
}

impl Role {
    /// Create a role bound to `db_name` with no TTL overrides
    pub fn new(name: impl Into<String>, db_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_name: db_name.into(),
            statements: Statements::default(),
            default_ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
        }
    }

    /// Set the statement sets
    pub fn with_statements(mut self, statements: Statements) -> Self {
        self.statements = statements;
        self
    }

    /// Set the role-level default TTL
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the role-level maximum TTL
    pub fn with_max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }
}

/// Connection settings and allow-list for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Unique target name
    pub name: String,
    /// Plugin that knows how to talk to this target (e.g. `postgresql`)
    pub plugin_name: String,
    /// Plugin-specific connection settings
    #[serde(default)]
    pub connection_details: serde_json::Map<String, serde_json::Value>,
    /// Role names or glob patterns allowed to use this target; `*` allows all
    #[serde(default)]
    pub allowed_roles: Vec<String>,
    /// Check a freshly opened connection before it is shared
    #[serde(default = "default_verify")]
    pub verify_connection: bool,
}

fn default_verify() -> bool {
    true
}

impl TargetConfig {
    /// Create a target config with no allowed roles
    pub fn new(name: impl Into<String>, plugin_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_name: plugin_name.into(),
            connection_details: serde_json::Map::new(),
            allowed_roles: Vec::new(),
            verify_connection: true,
        }
    }

    /// Replace the allow-list
    pub fn with_allowed_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Add a connection detail
    pub fn with_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.connection_details.insert(key.into(), value.into());
        self
    }

    /// Toggle connection verification
    pub fn with_verify_connection(mut self, verify: bool) -> Self {
        self.verify_connection = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_deserializes_humantime_ttls() {
        let role: Role = serde_json::from_str(
            r#"{
                "name": "readonly",
                "db_name": "analytics",
                "statements": { "creation": ["CREATE ROLE \"{{name}}\""] },
                "default_ttl": "1h",
                "max_ttl": "24h"
            }"#,
        )
        .unwrap();
        assert_eq!(role.default_ttl, Duration::from_secs(3600));
        assert_eq!(role.max_ttl, Duration::from_secs(86_400));
        assert_eq!(role.statements.creation.len(), 1);
        assert!(role.statements.revocation.is_empty());
    }

    #[test]
    fn role_ttls_default_to_unset() {
        let raw = r#"{"name":"r","db_name":"d"}"#;
        let role: Role = serde_json::from_str(raw).unwrap();
        assert_eq!(role.default_ttl, Duration::ZERO);
        assert_eq!(role.max_ttl, Duration::ZERO);
    }

    #[test]
    fn target_defaults() {
        let raw = r#"{"name":"analytics","plugin_name":"postgresql"}"#;
        let target: TargetConfig = serde_json::from_str(raw).unwrap();
        assert!(target.allowed_roles.is_empty());
        assert!(target.verify_connection);
        assert!(target.connection_details.is_empty());
    }
}
