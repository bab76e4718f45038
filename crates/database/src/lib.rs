//! # Keyward Database
//!
//! Dynamic, time-bounded credentials for database targets.
//!
//! A request names a role. The backend resolves the role and the target it
//! belongs to, checks the target's allow-list, clamps the lease TTL against
//! the system bounds, borrows (or lazily opens) the one shared session for
//! that target, and asks the target to create a principal that expires with
//! the lease.
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyward_database::{DatabaseBackend, MemoryStore, RequestContext, Role, TargetConfig};
//! # use keyward_database::{Connector, Result};
//! # async fn example(connector: Arc<dyn Connector>) -> Result<()> {
//! let store = MemoryStore::new();
//! store.put_target(
//!     TargetConfig::new("analytics", "postgresql").with_allowed_roles(["readonly"]),
//! );
//! store.put_role(Role::new("readonly", "analytics"));
//!
//! let backend = DatabaseBackend::builder()
//!     .store(Arc::new(store))
//!     .connector(connector)
//!     .build()?;
//!
//! let lease = backend
//!     .issue_credentials("readonly", &RequestContext::new("token-alice"))
//!     .await?;
//! println!("{} expires at {}", lease.username, lease.expires_at);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod generator;
pub mod lease;
pub mod permission;
pub mod pool;
pub mod role;
pub mod storage;
pub mod ttl;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use backend::{DatabaseBackend, DatabaseBackendBuilder};
pub use config::{BackendConfig, PoolConfig};
pub use connection::{ConnectionHandle, Connector, Database, GeneratedCredential, UsernameConfig};
pub use context::RequestContext;
pub use error::{BoxError, Error, Interrupted, Result};
pub use lease::{Lease, LeaseBuilder};
pub use pool::{ConnectionPool, PoolStats};
pub use role::{Role, Statements, TargetConfig};
pub use storage::{MemoryStore, RoleStore};
pub use ttl::{ResolvedTtl, SystemView};
