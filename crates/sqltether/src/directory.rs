//! Pool directory and connection entry point.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::config::{PoolConfig, redact_target};
use crate::driver::Driver;
use crate::error::Result;
use crate::pool::{Pool, PooledConnection};
use crate::worker::{ThreadRegistry, WorkerRegistry};

/// Registry of connection pools, one per connection target.
///
/// A directory is meant to live as long as the application: construct it
/// once at startup and share it (typically as `Arc<PoolDirectory<_>>`) with
/// every worker that needs a connection. Pools are created on first use and
/// kept until the directory is dropped.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use sqltether::PoolDirectory;
///
/// let directory = PoolDirectory::new(driver);
///
/// let conn = directory.connect("dbname=test", Duration::from_secs(3600))?;
/// let rows = conn.fetch_all("select * from t", &[])?;
/// conn.execute("update t set x = $1", &[1.into()])?;
/// ```
pub struct PoolDirectory<D: Driver, R: WorkerRegistry = ThreadRegistry> {
    driver: Arc<D>,
    registry: Arc<R>,
    pools: RwLock<HashMap<String, Arc<Pool<D, R>>>>,
}

impl<D: Driver> PoolDirectory<D, ThreadRegistry> {
    /// Create a directory whose workers are OS threads.
    pub fn new(driver: D) -> Self {
        Self::with_registry(driver, ThreadRegistry::new())
    }
}

impl<D: Driver, R: WorkerRegistry> PoolDirectory<D, R> {
    /// Create a directory with a custom worker registry.
    pub fn with_registry(driver: D, registry: R) -> Self {
        Self {
            driver: Arc::new(driver),
            registry: Arc::new(registry),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Get the calling worker's connection to `target`.
    ///
    /// Shorthand for [`connect_with`](Self::connect_with) with `timeout`.
    /// A new pool gets the default expiry policy; an existing pool keeps
    /// its own, so only a different `timeout` counts as a mismatch.
    pub fn connect(&self, target: &str, timeout: Duration) -> Result<PooledConnection<D>> {
        let config = match self.get(target) {
            Some(pool) => pool.config().clone().timeout(timeout),
            None => PoolConfig::new().timeout(timeout),
        };
        self.connect_with(target, &config)
    }

    /// Get the calling worker's connection to `target`.
    ///
    /// `config` only takes effect if this call creates the pool for
    /// `target`; see [`resolve`](Self::resolve).
    pub fn connect_with(&self, target: &str, config: &PoolConfig) -> Result<PooledConnection<D>> {
        self.resolve(target, config).get_current()
    }

    /// Find or create the pool for `target`.
    ///
    /// The first call for a target fixes the pool's configuration for the
    /// lifetime of the directory. Later calls with a different `config` get
    /// the existing pool unchanged; the mismatch is logged.
    pub fn resolve(&self, target: &str, config: &PoolConfig) -> Arc<Pool<D, R>> {
        let existing = self.pools.read().get(target).cloned();
        let pool = match existing {
            Some(pool) => pool,
            None => {
                let mut pools = self.pools.write();
                let pool = pools.entry(target.to_owned()).or_insert_with(|| {
                    tracing::info!(
                        dsn = %redact_target(target),
                        timeout = ?config.timeout,
                        expiry = ?config.expiry,
                        "created connection pool"
                    );
                    Arc::new(Pool::new(
                        target,
                        config.clone(),
                        Arc::clone(&self.driver),
                        Arc::clone(&self.registry),
                    ))
                });
                Arc::clone(pool)
            }
        };

        if pool.config() != config {
            tracing::warn!(
                dsn = %redact_target(target),
                requested = ?config,
                effective = ?pool.config(),
                "pool already exists with a different config, keeping the original"
            );
        }
        pool
    }

    /// Get the pool for `target` if one has been created.
    #[must_use]
    pub fn get(&self, target: &str) -> Option<Arc<Pool<D, R>>> {
        self.pools.read().get(target).cloned()
    }

    /// Targets that have a pool.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }

    /// Number of pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// Check if no pool has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }

    /// Get the worker registry.
    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }
}

impl<D: Driver, R: WorkerRegistry> fmt::Debug for PoolDirectory<D, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<String> = self
            .pools
            .read()
            .keys()
            .map(|target| redact_target(target))
            .collect();
        f.debug_struct("PoolDirectory")
            .field("targets", &targets)
            .finish()
    }
}
