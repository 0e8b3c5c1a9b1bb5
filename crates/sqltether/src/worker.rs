//! Worker identity.
//!
//! The pool keys connections by the identity of the calling worker and reaps
//! entries whose worker is gone. [`WorkerRegistry`] abstracts both
//! questions; [`ThreadRegistry`] answers them for OS threads.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashSet;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Identity of a worker (execution context).
///
/// Identifiers are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Create a worker id from a raw value.
    ///
    /// Intended for custom [`WorkerRegistry`] implementations.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source of worker identities.
pub trait WorkerRegistry: Send + Sync + 'static {
    /// Identity of the calling worker.
    fn current(&self) -> Result<WorkerId>;

    /// Identities of all workers that are still running.
    fn live_workers(&self) -> HashSet<WorkerId>;
}

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

static LIVE_THREADS: Lazy<RwLock<HashSet<WorkerId>>> =
    Lazy::new(|| RwLock::new(HashSet::new()));

/// Registers a thread on first use and deregisters it on thread exit.
struct ThreadSlot {
    id: WorkerId,
}

impl ThreadSlot {
    fn register() -> Self {
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));
        LIVE_THREADS.write().insert(id);
        tracing::trace!(worker = %id, "worker thread registered");
        Self { id }
    }
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        LIVE_THREADS.write().remove(&self.id);
        tracing::trace!(worker = %self.id, "worker thread exited");
    }
}

thread_local! {
    static CURRENT_THREAD: ThreadSlot = ThreadSlot::register();
}

/// Worker registry backed by OS threads.
///
/// A thread becomes a known worker the first time it asks for its identity
/// and stops being live when its thread-local storage is torn down, which
/// happens before `JoinHandle::join` returns. The set of live threads is
/// process-wide, so every `ThreadRegistry` value observes the same workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRegistry;

impl ThreadRegistry {
    /// Create a thread registry.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl WorkerRegistry for ThreadRegistry {
    fn current(&self) -> Result<WorkerId> {
        CURRENT_THREAD
            .try_with(|slot| slot.id)
            .map_err(|_| Error::WorkerUnavailable)
    }

    fn live_workers(&self) -> HashSet<WorkerId> {
        LIVE_THREADS.read().clone()
    }
}
