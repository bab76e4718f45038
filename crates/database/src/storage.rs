//! Role and target lookup

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{BoxError, Error, Result};
use crate::role::{Role, TargetConfig};

/// Durable storage of roles and target configurations.
///
/// Lookups return `Ok(None)` when the key does not exist; `Err` is reserved
/// for storage faults.
#[async_trait]
pub trait RoleStore: Send + Sync {
    /// Look up a role by name.
    async fn role(&self, name: &str) -> std::result::Result<Option<Role>, BoxError>;

    /// Look up a target configuration by name.
    async fn target_config(
        &self,
        name: &str,
    ) -> std::result::Result<Option<TargetConfig>, BoxError>;
}

/// Resolve `role_name` and its owning target.
///
/// A missing role is [`Error::NotFound`]. A role that points at a missing
/// target is a [`Error::Configuration`] fault.
pub async fn resolve(store: &dyn RoleStore, role_name: &str) -> Result<(Role, TargetConfig)> {
    let role = store
        .role(role_name)
        .await
        .map_err(|source| Error::Storage {
            key: format!("role/{role_name}"),
            source,
        })?
        .ok_or_else(|| Error::NotFound {
            role: role_name.to_string(),
        })?;

    let target = store
        .target_config(&role.db_name)
        .await
        .map_err(|source| Error::Storage {
            key: format!("config/{}", role.db_name),
            source,
        })?
        .ok_or_else(|| {
            Error::configuration(format!(
                "role '{}' references unknown target '{}'",
                role.name, role.db_name
            ))
        })?;

    Ok((role, target))
}

/// In-memory [`RoleStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    roles: DashMap<String, Role>,
    targets: DashMap<String, TargetConfig>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role
    pub fn put_role(&self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Insert or replace a target configuration
    pub fn put_target(&self, target: TargetConfig) {
        self.targets.insert(target.name.clone(), target);
    }

    /// Remove a role, returning it if present
    pub fn remove_role(&self, name: &str) -> Option<Role> {
        self.roles.remove(name).map(|(_, role)| role)
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn role(&self, name: &str) -> std::result::Result<Option<Role>, BoxError> {
        Ok(self.roles.get(name).map(|entry| entry.value().clone()))
    }

    async fn target_config(
        &self,
        name: &str,
    ) -> std::result::Result<Option<TargetConfig>, BoxError> {
        Ok(self.targets.get(name).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenStore;

    #[async_trait]
    impl RoleStore for BrokenStore {
        async fn role(&self, _name: &str) -> std::result::Result<Option<Role>, BoxError> {
            Err("disk on fire".into())
        }

        async fn target_config(
            &self,
            _name: &str,
        ) -> std::result::Result<Option<TargetConfig>, BoxError> {
            Ok(None)
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.put_target(TargetConfig::new("analytics", "postgresql"));
        store.put_role(Role::new("readonly", "analytics"));
        store.put_role(Role::new("orphan", "missing"));
        store
    }

    #[tokio::test]
    async fn resolves_role_and_target() {
        let (role, target) = resolve(&store(), "readonly").await.unwrap();
        assert_eq!(role.name, "readonly");
        assert_eq!(target.name, "analytics");
    }

    #[tokio::test]
    async fn unknown_role_is_not_found() {
        let err = resolve(&store(), "ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref role } if role == "ghost"));
    }

    #[tokio::test]
    async fn dangling_target_is_configuration_error() {
        let err = resolve(&store(), "orphan").await.unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn storage_fault_is_wrapped() {
        let err = resolve(&BrokenStore, "readonly").await.unwrap_err();
        assert!(matches!(err, Error::Storage { ref key, .. } if key == "role/readonly"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn remove_role() {
        let store = store();
        assert!(store.remove_role("readonly").is_some());
        assert!(store.role("readonly").await.unwrap().is_none());
    }
}
