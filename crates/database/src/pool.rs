//! Connection pool: one live session per target, created on first demand.
//!
//! Each target name maps to a slot that moves through
//! `Absent → Creating → Live → Absent`. The transition out of `Absent`
//! happens under the exclusive lock, so exactly one caller becomes the
//! creator. Everyone else either reads the `Live` handle under the shared
//! lock or parks on the creator's completion channel and re-reads. No lock
//! is held while connecting.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::connection::{ConnectionHandle, Connector, Database};
use crate::context::RequestContext;
use crate::error::{BoxError, Error, Result};
use crate::role::TargetConfig;

/// Pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions successfully opened.
    pub created: u64,
    /// Requests served by an existing live session.
    pub reused: u64,
    /// Times a request parked behind another caller's creation.
    pub waited: u64,
    /// Sessions removed after a fatal error or an explicit reset.
    pub invalidated: u64,
    /// Failed or interrupted creation attempts.
    pub failed: u64,
    /// Sessions currently live.
    pub live: usize,
}

enum Slot {
    Creating {
        generation: u64,
        done: watch::Receiver<()>,
    },
    Live(ConnectionHandle),
}

enum Lookup {
    Live(ConnectionHandle),
    Wait(watch::Receiver<()>),
    Absent,
}

fn lookup(slots: &HashMap<String, Slot>, name: &str) -> Lookup {
    match slots.get(name) {
        Some(Slot::Live(handle)) => Lookup::Live(handle.clone()),
        Some(Slot::Creating { done, .. }) => Lookup::Wait(done.clone()),
        None => Lookup::Absent,
    }
}

/// Owns the `Creating` slot for the duration of a creation attempt.
///
/// Dropping it without [`commit`](Self::commit) (error, timeout, or the
/// request future being dropped) returns the slot to `Absent`. The sender
/// drops after the slot is cleaned up, which wakes every parked waiter.
struct CreationGuard<'a> {
    pool: &'a ConnectionPool,
    name: &'a str,
    generation: u64,
    committed: bool,
    _done: watch::Sender<()>,
}

impl CreationGuard<'_> {
    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut slots = self.pool.slots.write();
        let ours = matches!(
            slots.get(self.name),
            Some(Slot::Creating { generation, .. }) if *generation == self.generation
        );
        if ours {
            slots.remove(self.name);
        }
    }
}

/// Lazily populated map of target name to live session.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    slots: RwLock<HashMap<String, Slot>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
    stats: Mutex<PoolStats>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl ConnectionPool {
    /// Create an empty pool.
    ///
    /// # Errors
    /// Returns error if `config` is invalid.
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connector,
            config,
            slots: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            stats: Mutex::new(PoolStats::default()),
        })
    }

    /// Return the live session for `target`, opening one if none exists.
    ///
    /// Concurrent callers for the same target share a single creation. A
    /// failed creation is reported to the caller that attempted it; parked
    /// callers then race for the next attempt. Nothing is retried here.
    pub async fn get_or_create(
        &self,
        target: &TargetConfig,
        ctx: &RequestContext,
    ) -> Result<ConnectionHandle> {
        let name = target.name.as_str();
        loop {
            let found = lookup(&self.slots.read(), name);
            match found {
                Lookup::Live(handle) => {
                    self.stats.lock().reused += 1;
                    return Ok(handle);
                }
                Lookup::Wait(done) => {
                    self.wait_for_creation(name, done, ctx).await?;
                    continue;
                }
                Lookup::Absent => {}
            }

            if self.closed.load(Ordering::Acquire) {
                return Err(Error::connection(name, "connection pool is shut down"));
            }

            let guard = {
                let mut slots = self.slots.write();
                match lookup(&slots, name) {
                    Lookup::Live(handle) => {
                        drop(slots);
                        self.stats.lock().reused += 1;
                        return Ok(handle);
                    }
                    Lookup::Wait(done) => Err(done),
                    Lookup::Absent => {
                        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = watch::channel(());
                        slots.insert(
                            name.to_string(),
                            Slot::Creating {
                                generation,
                                done: rx,
                            },
                        );
                        Ok(CreationGuard {
                            pool: self,
                            name,
                            generation,
                            committed: false,
                            _done: tx,
                        })
                    }
                }
            };

            match guard {
                Ok(guard) => return self.create(target, ctx, guard).await,
                Err(done) => self.wait_for_creation(name, done, ctx).await?,
            }
        }
    }

    async fn wait_for_creation(
        &self,
        name: &str,
        mut done: watch::Receiver<()>,
        ctx: &RequestContext,
    ) -> Result<()> {
        self.stats.lock().waited += 1;
        debug!(db_name = %name, "waiting for in-flight connection");
        // The creator never sends; `changed` resolves once its sender drops.
        ctx.bounded("wait for connection", None, done.changed())
            .await
            .map(|_| ())
            .map_err(|interrupted| Error::connection(name, interrupted))
    }

    async fn create(
        &self,
        target: &TargetConfig,
        ctx: &RequestContext,
        mut guard: CreationGuard<'_>,
    ) -> Result<ConnectionHandle> {
        let name = target.name.as_str();
        let generation = guard.generation;
        debug!(db_name = %name, generation, plugin = %target.plugin_name, "opening connection");

        let opened = ctx
            .bounded("connect", Some(self.config.connect_timeout), self.open(target, ctx))
            .await;
        let database = match opened {
            Ok(Ok(database)) => database,
            Ok(Err(source)) => return Err(self.creation_failed(name, source)),
            Err(interrupted) => return Err(self.creation_failed(name, interrupted.into())),
        };

        let handle = ConnectionHandle::new(name.to_string(), generation, Arc::clone(&database));
        {
            let mut slots = self.slots.write();
            if self.closed.load(Ordering::Acquire) {
                drop(slots);
                drop(guard);
                spawn_close(name, database);
                return Err(self.creation_failed(
                    name,
                    "connection pool shut down during connect".into(),
                ));
            }
            slots.insert(name.to_string(), Slot::Live(handle.clone()));
            guard.commit();
        }
        drop(guard);

        self.stats.lock().created += 1;
        info!(db_name = %name, generation, "connection established");
        Ok(handle)
    }

    async fn open(
        &self,
        target: &TargetConfig,
        ctx: &RequestContext,
    ) -> std::result::Result<Arc<dyn Database>, BoxError> {
        let database = self.connector.connect(target, ctx).await?;
        if target.verify_connection {
            if let Err(e) = database.verify().await {
                if let Err(close_err) = database.close().await {
                    debug!(db_name = %target.name, error = %close_err, "close after failed verify");
                }
                return Err(e);
            }
        }
        Ok(database)
    }

    fn creation_failed(&self, name: &str, source: BoxError) -> Error {
        self.stats.lock().failed += 1;
        warn!(db_name = %name, error = %source, "failed to open connection");
        Error::connection(name, source)
    }

    /// Drop `handle` from the pool if `error` shows its session is dead.
    ///
    /// Only the exact handle is removed: if the slot was already replaced by a
    /// newer session, nothing happens. The session is closed on a background
    /// task. Returns whether the handle was evicted.
    pub fn invalidate_if_unusable(&self, handle: &ConnectionHandle, error: &Error) -> bool {
        if !error.is_connection_fatal() {
            return false;
        }
        self.evict(handle, "fatal connection error")
    }

    /// Close and remove the live session for `name`, if any.
    ///
    /// The next request for the target opens a fresh session. Returns whether
    /// a session was removed.
    pub fn reset(&self, name: &str) -> bool {
        let current = match lookup(&self.slots.read(), name) {
            Lookup::Live(handle) => handle,
            Lookup::Wait(_) | Lookup::Absent => return false,
        };
        self.evict(&current, "reset requested")
    }

    fn evict(&self, handle: &ConnectionHandle, reason: &str) -> bool {
        let removed = {
            let mut slots = self.slots.write();
            let current = matches!(
                slots.get(handle.target()),
                Some(Slot::Live(live)) if live.same_as(handle)
            );
            if current {
                slots.remove(handle.target());
            }
            current
        };

        if !removed {
            return false;
        }

        handle.mark_dead();
        self.stats.lock().invalidated += 1;
        info!(
            db_name = %handle.target(),
            generation = handle.generation(),
            reason,
            "connection invalidated"
        );
        spawn_close(handle.target(), Arc::clone(handle.database()));
        true
    }

    /// The live session for `name`, without creating one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ConnectionHandle> {
        match lookup(&self.slots.read(), name) {
            Lookup::Live(handle) => Some(handle),
            Lookup::Wait(_) | Lookup::Absent => None,
        }
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let live = self
            .slots
            .read()
            .values()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count();
        PoolStats {
            live,
            ..*self.stats.lock()
        }
    }

    /// Close every live session and refuse further creations.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<ConnectionHandle> = {
            let mut slots = self.slots.write();
            let names: Vec<String> = slots
                .iter()
                .filter(|(_, slot)| matches!(slot, Slot::Live(_)))
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| match slots.remove(&name) {
                    Some(Slot::Live(handle)) => Some(handle),
                    _ => None,
                })
                .collect()
        };

        for handle in drained {
            handle.mark_dead();
            if let Err(e) = handle.database().close().await {
                warn!(db_name = %handle.target(), error = %e, "failed to close connection");
            }
        }
        info!("connection pool shut down");
    }
}

fn spawn_close(name: &str, database: Arc<dyn Database>) {
    let name = name.to_string();
    let close = async move {
        if let Err(e) = database.close().await {
            warn!(db_name = %name, error = %e, "failed to close connection");
        }
    };
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(close);
    } else {
        debug!("no runtime available, dropping connection without close");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{MockConnector, MockDatabase};

    fn target() -> TargetConfig {
        TargetConfig::new("analytics", "mock")
    }

    fn pool(connector: &Arc<MockConnector>) -> ConnectionPool {
        ConnectionPool::new(Arc::clone(connector) as Arc<dyn Connector>, PoolConfig::default())
            .unwrap()
    }

    fn fatal() -> Error {
        Error::Generation {
            target: "analytics".into(),
            connection_fatal: true,
            source: "broken pipe".into(),
        }
    }

    #[tokio::test]
    async fn second_call_reuses_handle() {
        let connector = Arc::new(MockConnector::new());
        let pool = pool(&connector);
        let ctx = RequestContext::new("t");

        let first = pool.get_or_create(&target(), &ctx).await.unwrap();
        let second = pool.get_or_create(&target(), &ctx).await.unwrap();

        assert!(first.same_as(&second));
        assert_eq!(connector.connect_count(), 1);
        let stats = pool.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.live, 1);
    }

    #[tokio::test]
    async fn failed_connect_leaves_slot_absent() {
        let connector = Arc::new(MockConnector::new());
        connector.fail_next_connects(1);
        let pool = pool(&connector);
        let ctx = RequestContext::new("t");

        let err = pool.get_or_create(&target(), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert!(err.is_retryable());
        assert!(pool.get("analytics").is_none());
        assert_eq!(pool.stats().failed, 1);

        pool.get_or_create(&target(), &ctx).await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }

    #[tokio::test]
    async fn failed_verify_closes_session() {
        let database = Arc::new(MockDatabase::new("mock").failing_verify());
        let connector = Arc::new(MockConnector::with_database(database.clone()));
        let pool = pool(&connector);

        let err = pool
            .get_or_create(&target(), &RequestContext::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
        assert_eq!(database.close_count(), 1);
        assert!(pool.get("analytics").is_none());
    }

    #[tokio::test]
    async fn verify_skipped_when_disabled() {
        let database = Arc::new(MockDatabase::new("mock").failing_verify());
        let connector = Arc::new(MockConnector::with_database(database));
        let pool = pool(&connector);

        pool.get_or_create(
            &target().with_verify_connection(false),
            &RequestContext::new("t"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn invalidate_ignores_non_fatal_errors() {
        let connector = Arc::new(MockConnector::new());
        let pool = pool(&connector);
        let handle = pool
            .get_or_create(&target(), &RequestContext::new("t"))
            .await
            .unwrap();

        let soft = Error::Generation {
            target: "analytics".into(),
            connection_fatal: false,
            source: "syntax error".into(),
        };
        assert!(!pool.invalidate_if_unusable(&handle, &soft));
        assert!(handle.is_live());
        assert!(pool.get("analytics").is_some());
    }

    #[tokio::test]
    async fn invalidate_removes_only_matching_handle() {
        let connector = Arc::new(MockConnector::new());
        let pool = pool(&connector);
        let ctx = RequestContext::new("t");

        let stale = pool.get_or_create(&target(), &ctx).await.unwrap();
        assert!(pool.invalidate_if_unusable(&stale, &fatal()));
        assert!(!stale.is_live());

        let fresh = pool.get_or_create(&target(), &ctx).await.unwrap();
        assert_ne!(stale.generation(), fresh.generation());

        // A late report against the old handle must not evict the new one.
        assert!(!pool.invalidate_if_unusable(&stale, &fatal()));
        assert!(fresh.is_live());
        assert_eq!(pool.stats().invalidated, 1);
    }

    #[tokio::test]
    async fn reset_closes_live_session() {
        let database = Arc::new(MockDatabase::new("mock"));
        let connector = Arc::new(MockConnector::with_database(database.clone()));
        let pool = pool(&connector);
        pool.get_or_create(&target(), &RequestContext::new("t"))
            .await
            .unwrap();

        assert!(pool.reset("analytics"));
        assert!(!pool.reset("analytics"));
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(database.close_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_and_refuses() {
        let database = Arc::new(MockDatabase::new("mock"));
        let connector = Arc::new(MockConnector::with_database(database.clone()));
        let pool = pool(&connector);
        let ctx = RequestContext::new("t");
        let handle = pool.get_or_create(&target(), &ctx).await.unwrap();

        pool.shutdown().await;

        assert!(!handle.is_live());
        assert_eq!(database.close_count(), 1);
        assert_eq!(pool.stats().live, 0);
        let err = pool.get_or_create(&target(), &ctx).await.unwrap_err();
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = PoolConfig {
            connect_timeout: Duration::ZERO,
        };
        assert!(ConnectionPool::new(Arc::new(MockConnector::new()), config).is_err());
    }
}
