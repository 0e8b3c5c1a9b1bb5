//! Manually driven worker registry.
//!
//! Real thread lifetimes make reaping tests depend on thread scheduling.
//! [`ManualRegistry`] lets a test decide which workers exist and which one
//! is calling.

use hashbrown::HashSet;
use parking_lot::Mutex;
use sqltether::{Error, Result, WorkerId, WorkerRegistry};

#[derive(Debug, Default)]
struct State {
    next: u64,
    live: HashSet<WorkerId>,
    current: Option<WorkerId>,
}

/// Worker registry whose workers are started and stopped by the test.
#[derive(Debug, Default)]
pub struct ManualRegistry {
    state: Mutex<State>,
}

impl ManualRegistry {
    /// Create a registry with no workers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new worker and return its id.
    pub fn spawn(&self) -> WorkerId {
        let mut state = self.state.lock();
        state.next += 1;
        let id = WorkerId::from_raw(state.next);
        state.live.insert(id);
        id
    }

    /// Stop a worker.
    pub fn exit(&self, worker: WorkerId) {
        let mut state = self.state.lock();
        state.live.remove(&worker);
        if state.current == Some(worker) {
            state.current = None;
        }
    }

    /// Make `worker` the calling worker.
    pub fn enter(&self, worker: WorkerId) {
        self.state.lock().current = Some(worker);
    }
}

impl WorkerRegistry for ManualRegistry {
    fn current(&self) -> Result<WorkerId> {
        self.state.lock().current.ok_or(Error::WorkerUnavailable)
    }

    fn live_workers(&self) -> HashSet<WorkerId> {
        self.state.lock().live.clone()
    }
}
