//! In-memory doubles for the target traits.
//!
//! Available to this crate's tests and, with the `test-util` feature, to
//! downstream crates.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use secrecy::SecretString;

use crate::connection::{Connector, Database, GeneratedCredential, UsernameConfig};
use crate::context::RequestContext;
use crate::error::BoxError;
use crate::role::{Statements, TargetConfig};

/// Failure injected into the next `create_user` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The session is gone; classified as connection-fatal.
    ConnectionLost,
    /// The target refused the statements; the session is fine.
    Rejected,
}

/// Error type returned by [`MockDatabase`].
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    /// Session dropped mid-call
    #[error("mock connection lost")]
    ConnectionLost,
    /// Statement rejected by the target
    #[error("mock statement rejected")]
    Rejected,
    /// Verification failed
    #[error("mock verify failed")]
    VerifyFailed,
}

/// A session that mints predictable, unique credentials.
#[derive(Debug)]
pub struct MockDatabase {
    plugin: String,
    failing_verify: bool,
    create_latency: Option<Duration>,
    failures: Mutex<VecDeque<MockFailure>>,
    creates: AtomicU64,
    closes: AtomicUsize,
    seen_expirations: Mutex<Vec<DateTime<Utc>>>,
}

impl MockDatabase {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            failing_verify: false,
            create_latency: None,
            failures: Mutex::new(VecDeque::new()),
            creates: AtomicU64::new(0),
            closes: AtomicUsize::new(0),
            seen_expirations: Mutex::new(Vec::new()),
        }
    }

    /// Make every `verify` call fail.
    pub fn failing_verify(mut self) -> Self {
        self.failing_verify = true;
        self
    }

    /// Delay each `create_user` call.
    pub fn with_create_latency(mut self, latency: Duration) -> Self {
        self.create_latency = Some(latency);
        self
    }

    /// Queue a failure for an upcoming `create_user` call.
    pub fn fail_next_create(&self, failure: MockFailure) {
        self.failures.lock().push_back(failure);
    }

    /// Number of `create_user` calls, successful or not.
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Expirations passed to `create_user`, in call order.
    pub fn expirations(&self) -> Vec<DateTime<Utc>> {
        self.seen_expirations.lock().clone()
    }
}

#[async_trait]
impl Database for MockDatabase {
    fn plugin_name(&self) -> &str {
        &self.plugin
    }

    async fn create_user(
        &self,
        _statements: &Statements,
        username: &UsernameConfig,
        expiration: DateTime<Utc>,
    ) -> Result<GeneratedCredential, BoxError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(latency) = self.create_latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failures.lock().pop_front();
        match failure {
            Some(MockFailure::ConnectionLost) => return Err(MockError::ConnectionLost.into()),
            Some(MockFailure::Rejected) => return Err(MockError::Rejected.into()),
            None => {}
        }

        self.seen_expirations.lock().push(expiration);
        let nonce = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Ok(GeneratedCredential {
            username: format!("v-{}-{}-{n}", username.display_name, username.role_name),
            password: SecretString::from(format!("A1a-{n}-{nonce:x}")),
        })
    }

    fn is_connection_fatal(
        &self,
        error: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool {
        matches!(error.downcast_ref::<MockError>(), Some(MockError::ConnectionLost))
    }

    async fn verify(&self) -> Result<(), BoxError> {
        if self.failing_verify {
            return Err(MockError::VerifyFailed.into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that hands out [`MockDatabase`] sessions.
#[derive(Debug, Default)]
pub struct MockConnector {
    shared: Option<Arc<MockDatabase>>,
    latency: Option<Duration>,
    pending_failures: AtomicUsize,
    connects: AtomicUsize,
    opened: Mutex<Vec<Arc<MockDatabase>>>,
}

impl MockConnector {
    /// Each connect yields a fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect yields `database`.
    pub fn with_database(database: Arc<MockDatabase>) -> Self {
        Self {
            shared: Some(database),
            ..Self::default()
        }
    }

    /// Delay each connect.
    pub fn with_connect_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail the next `n` connects.
    pub fn fail_next_connects(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of connect attempts, including failed ones.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sessions handed out so far, oldest first.
    pub fn opened(&self) -> Vec<Arc<MockDatabase>> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        config: &TargetConfig,
        _ctx: &RequestContext,
    ) -> Result<Arc<dyn Database>, BoxError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let fail = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(format!("mock connect to {} refused", config.name).into());
        }

        let database = self.shared.as_ref().map_or_else(
            || Arc::new(MockDatabase::new(config.plugin_name.clone())),
            Arc::clone,
        );
        self.opened.lock().push(Arc::clone(&database));
        Ok(database)
    }
}
