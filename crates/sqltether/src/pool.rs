//! Per-worker connection pool implementation.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::config::{PoolConfig, redact_target};
use crate::connection::{Health, ManagedConnection};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::worker::{ThreadRegistry, WorkerId, WorkerRegistry};

/// A connection handed out by a pool.
pub type PooledConnection<D> = Arc<ManagedConnection<<D as Driver>::Connection>>;

/// A connection pool keeping one connection per worker for a single target.
///
/// Each worker gets its own connection, created lazily on its first
/// [`get`](Self::get) and reused on later calls until it goes stale or is
/// closed. Entries belonging to workers that have exited are reaped on every
/// `get`. There is no background thread: all maintenance happens inline.
///
/// The map lock is never held across driver I/O, so workers with a healthy
/// cached connection only contend on a read lock.
pub struct Pool<D: Driver, R: WorkerRegistry = ThreadRegistry> {
    target: Arc<str>,
    display_target: String,
    config: PoolConfig,
    driver: Arc<D>,
    registry: Arc<R>,
    connections: RwLock<HashMap<WorkerId, PooledConnection<D>>>,
}

impl<D: Driver, R: WorkerRegistry> Pool<D, R> {
    /// Create a pool for `target`.
    ///
    /// No connection is opened until a worker asks for one.
    pub fn new(
        target: impl Into<Arc<str>>,
        config: PoolConfig,
        driver: Arc<D>,
        registry: Arc<R>,
    ) -> Self {
        let target = target.into();
        Self {
            display_target: redact_target(&target),
            target,
            config,
            driver,
            registry,
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Get the connection of the calling worker.
    pub fn get_current(&self) -> Result<PooledConnection<D>> {
        let worker = self.registry.current()?;
        self.get(worker)
    }

    /// Get the connection of `worker`, creating one if needed.
    ///
    /// A cached connection that is mid-query or mid-transaction is left
    /// untouched and reported as [`Error::PoolState`]: the worker returned
    /// it without finishing its work. A cached connection that is closed or
    /// stale is replaced. Entries of exited workers are reaped.
    ///
    /// Must not be called concurrently for the same `worker`.
    pub fn get(&self, worker: WorkerId) -> Result<PooledConnection<D>> {
        let cached = self.connections.read().get(&worker).cloned();
        if let Some(conn) = cached {
            match conn.health() {
                Health::Unusable {
                    status,
                    transaction,
                } => {
                    tracing::warn!(
                        dsn = %self.display_target,
                        worker = %worker,
                        ?status,
                        ?transaction,
                        "pooled connection returned mid-query or mid-transaction"
                    );
                    return Err(Error::PoolState {
                        worker,
                        status,
                        transaction,
                    });
                }
                Health::Closed => self.evict(worker, &conn, "closed"),
                Health::Reusable => {
                    if conn.is_stale(self.config.expiry, self.config.timeout) {
                        self.evict(worker, &conn, "stale");
                    }
                }
            }
        }

        self.reap_except(Some(worker));

        let cached = self.connections.read().get(&worker).cloned();
        if let Some(conn) = cached {
            conn.mark_checkout();
            tracing::trace!(dsn = %self.display_target, worker = %worker, "reusing pooled connection");
            return Ok(conn);
        }

        let raw = self.driver.connect(&self.target).map_err(Error::Driver)?;
        let conn = Arc::new(ManagedConnection::new(raw));
        conn.mark_checkout();
        self.connections.write().insert(worker, Arc::clone(&conn));
        tracing::debug!(dsn = %self.display_target, worker = %worker, "opened new connection");
        Ok(conn)
    }

    /// Close and remove the connections of all workers that have exited.
    ///
    /// Returns the number of connections reaped.
    pub fn reap(&self) -> usize {
        self.reap_except(None)
    }

    /// Close and remove every connection in the pool.
    ///
    /// Returns the number of connections closed. Workers still holding one
    /// of them will see [`Error::ConnectionClosed`] on their next query and
    /// get a fresh connection on their next `get`.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().drain().collect();
        let count = drained.len();
        for (_, conn) in drained {
            conn.close();
        }
        tracing::info!(dsn = %self.display_target, count, "connection pool cleared");
        count
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            connections: self.connections.read().len(),
            live_workers: self.registry.live_workers().len(),
        }
    }

    /// Get the connection target.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn evict(&self, worker: WorkerId, conn: &PooledConnection<D>, reason: &'static str) {
        let removed = {
            let mut connections = self.connections.write();
            let same = connections
                .get(&worker)
                .is_some_and(|cached| Arc::ptr_eq(cached, conn));
            if same {
                connections.remove(&worker)
            } else {
                None
            }
        };
        if let Some(conn) = removed {
            tracing::debug!(dsn = %self.display_target, worker = %worker, reason, "evicting connection");
            conn.close();
        }
    }

    fn reap_except(&self, keep: Option<WorkerId>) -> usize {
        // Keys are collected before the live snapshot: a worker registers
        // before it can insert an entry, so no live worker is mistaken for
        // an exited one.
        let candidates: Vec<WorkerId> = self
            .connections
            .read()
            .keys()
            .copied()
            .filter(|worker| Some(*worker) != keep)
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let live = self.registry.live_workers();
        let dead: Vec<WorkerId> = candidates
            .into_iter()
            .filter(|worker| !live.contains(worker))
            .collect();
        if dead.is_empty() {
            return 0;
        }

        let reaped: Vec<_> = {
            let mut connections = self.connections.write();
            dead.iter()
                .filter_map(|worker| connections.remove_entry(worker))
                .collect()
        };
        let count = reaped.len();
        for (worker, conn) in reaped {
            tracing::debug!(dsn = %self.display_target, worker = %worker, "reaping connection of exited worker");
            conn.close();
        }
        count
    }
}

impl<D: Driver, R: WorkerRegistry> fmt::Debug for Pool<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("target", &self.display_target)
            .field("config", &self.config)
            .field("connections", &self.connections.read().len())
            .finish()
    }
}

/// Status information about a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of connections held by the pool.
    pub connections: usize,
    /// Number of live workers known to the pool's registry.
    pub live_workers: usize,
}
