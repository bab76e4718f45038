//! The credential-issuing backend
//!
//! [`DatabaseBackend`] ties the pieces together for a single request:
//! resolve the role, check the target's allow-list, clamp the TTL, obtain a
//! pooled session, mint the principal, and package the lease.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::{BackendConfig, PoolConfig};
use crate::connection::{Connector, UsernameConfig};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::generator;
use crate::lease::{Lease, LeaseBuilder};
use crate::permission;
use crate::pool::{ConnectionPool, PoolStats};
use crate::storage::{self, RoleStore};
use crate::ttl::{self, SystemView};

/// Issues time-bounded credentials against configured targets.
#[derive(Clone)]
pub struct DatabaseBackend {
    store: Arc<dyn RoleStore>,
    system: Arc<dyn SystemView>,
    pool: Arc<ConnectionPool>,
}

impl std::fmt::Debug for DatabaseBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBackend")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl DatabaseBackend {
    /// Start building a backend.
    pub fn builder() -> DatabaseBackendBuilder {
        DatabaseBackendBuilder::new()
    }

    /// Issue fresh credentials for `role_name`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the role does not exist
    /// - [`Error::PermissionDenied`] if the target does not admit the role
    /// - [`Error::Connection`] if no session could be opened
    /// - [`Error::Generation`] if the target failed to create the principal;
    ///   the principal may or may not exist afterwards
    #[instrument(skip(self, ctx), fields(display_name = %ctx.display_name))]
    pub async fn issue_credentials(&self, role_name: &str, ctx: &RequestContext) -> Result<Lease> {
        let (role, target) = match storage::resolve(self.store.as_ref(), role_name).await {
            Ok(found) => found,
            Err(e @ Error::NotFound { .. }) => {
                debug!(role = %role_name, "role not found");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = permission::authorize(&role.name, &target.allowed_roles) {
            debug!(role = %role.name, db_name = %target.name, "role not allowed on target");
            return Err(e);
        }

        let resolved = ttl::resolve(role.default_ttl, role.max_ttl, self.system.as_ref());
        let handle = self.pool.get_or_create(&target, ctx).await?;

        let lease = LeaseBuilder::new(&role.name).ttl(resolved);
        let username = UsernameConfig {
            display_name: ctx.display_name.clone(),
            role_name: role.name.clone(),
        };
        let generated = generator::generate(
            &handle,
            &role.statements,
            &username,
            lease.expires_at(),
            ctx,
        )
        .await;

        let credential = match generated {
            Ok(credential) => credential,
            Err(e) => {
                self.pool.invalidate_if_unusable(&handle, &e);
                return Err(e);
            }
        };

        let lease = lease.credential(credential).build();
        info!(
            role = %role.name,
            db_name = %target.name,
            generation = handle.generation(),
            ttl = ?lease.ttl,
            "issued credentials"
        );
        Ok(lease)
    }

    /// Close the live session for `target`, if any. The next request opens a
    /// new one.
    pub fn reset_connection(&self, target: &str) -> bool {
        self.pool.reset(target)
    }

    /// Close every session. Later requests fail with [`Error::Connection`].
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// The connection pool
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Pool counters
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

/// Builder for [`DatabaseBackend`].
///
/// A role store and a connector are required. The system lease bounds
/// default to [`BackendConfig::default`].
#[derive(Default)]
pub struct DatabaseBackendBuilder {
    store: Option<Arc<dyn RoleStore>>,
    system: Option<Arc<dyn SystemView>>,
    config: BackendConfig,
    connector: Option<Arc<dyn Connector>>,
    pool_config: PoolConfig,
}

impl DatabaseBackendBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Role and target storage (required)
    pub fn store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Connector used to open sessions (required)
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Static lease bounds. Ignored when [`system`](Self::system) is set.
    pub fn config(mut self, config: BackendConfig) -> Self {
        self.config = config;
        self
    }

    /// Live view of the system lease bounds
    pub fn system(mut self, system: Arc<dyn SystemView>) -> Self {
        self.system = Some(system);
        self
    }

    /// Pool settings
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Build the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a required part is missing or a
    /// config fails validation.
    pub fn build(self) -> Result<DatabaseBackend> {
        let store = self
            .store
            .ok_or_else(|| Error::configuration("role store is required"))?;
        let connector = self
            .connector
            .ok_or_else(|| Error::configuration("connector is required"))?;
        let system: Arc<dyn SystemView> = if let Some(system) = self.system {
            system
        } else {
            self.config.validate()?;
            Arc::new(self.config)
        };
        let pool = ConnectionPool::new(connector, self.pool_config)?;

        Ok(DatabaseBackend {
            store,
            system,
            pool: Arc::new(pool),
        })
    }
}
