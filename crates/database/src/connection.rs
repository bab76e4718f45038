//! Target capability traits and the pooled connection handle

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::context::RequestContext;
use crate::error::BoxError;
use crate::role::{Statements, TargetConfig};

/// Identity hints the target may fold into the generated username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameConfig {
    /// Display name of the requesting caller
    pub display_name: String,
    /// Role the credentials are issued for
    pub role_name: String,
}

/// Username and secret minted by the target.
#[derive(Debug, Clone)]
pub struct GeneratedCredential {
    /// Principal name created on the target
    pub username: String,
    /// Secret for the principal
    pub password: SecretString,
}

/// A live session to a target that can mint principals.
///
/// `create_user` mutates the target and is not idempotent; callers must not
/// retry it blindly.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Plugin name reported in logs (e.g. `postgresql`).
    fn plugin_name(&self) -> &str;

    /// Create a principal that expires at `expiration`.
    async fn create_user(
        &self,
        statements: &Statements,
        username: &UsernameConfig,
        expiration: DateTime<Utc>,
    ) -> Result<GeneratedCredential, BoxError>;

    /// Whether `error`, returned by this session, means the session itself is
    /// unusable and must be replaced. Unknown errors are not fatal.
    fn is_connection_fatal(
        &self,
        _error: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool {
        false
    }

    /// Check the session before it is shared.
    async fn verify(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Release the session.
    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Opens sessions to targets.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new session using `config`.
    async fn connect(
        &self,
        config: &TargetConfig,
        ctx: &RequestContext,
    ) -> Result<Arc<dyn Database>, BoxError>;
}

/// Shared handle to a pooled session.
///
/// Clones refer to the same session and liveness flag. Once the pool
/// invalidates a handle, [`is_live`](Self::is_live) turns false for every
/// clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    target: String,
    generation: u64,
    database: Arc<dyn Database>,
    live: AtomicBool,
    created_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub(crate) fn new(target: String, generation: u64, database: Arc<dyn Database>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                target,
                generation,
                database,
                live: AtomicBool::new(true),
                created_at: Utc::now(),
            }),
        }
    }

    /// Target this handle connects to
    #[must_use]
    pub fn target(&self) -> &str {
        &self.inner.target
    }

    /// Pool-assigned creation sequence number, unique per pool
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    /// The underlying session
    #[must_use]
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.inner.database
    }

    /// When the session was opened
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// False once the pool has invalidated this handle
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Returns whether this call flipped the flag.
    pub(crate) fn mark_dead(&self) -> bool {
        self.inner.live.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("target", &self.inner.target)
            .field("generation", &self.inner.generation)
            .field("plugin", &self.inner.database.plugin_name())
            .field("live", &self.is_live())
            .field("created_at", &self.inner.created_at)
            .finish()
    }
}
