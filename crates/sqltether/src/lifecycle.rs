//! Connection lifecycle metadata.
//!
//! Every managed connection carries a [`ConnectionMetadata`] record which the
//! pool consults, together with the pool's [`ExpiryPolicy`], to decide
//! whether a cached connection is still fit for reuse.

use std::time::{Duration, Instant};

/// Which instant a pool's timeout is measured from.
///
/// A pool applies exactly one policy to all of its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Sliding window: a connection is stale once it has not been handed out
    /// for longer than the timeout.
    #[default]
    Idle,
    /// Absolute: a connection is stale once it is older than the timeout,
    /// however recently it was used.
    Lifetime,
}

/// Metadata about a managed connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last handed out by the pool.
    pub last_used_at: Instant,
    /// Number of times the pool handed out this connection.
    pub checkout_count: u64,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
        }
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last handed out.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_used_at.elapsed()
    }

    /// Instant after which the connection is stale under `policy`.
    ///
    /// Returns `None` if the deadline is not representable.
    #[must_use]
    pub fn expires_at(&self, policy: ExpiryPolicy, timeout: Duration) -> Option<Instant> {
        let reference = match policy {
            ExpiryPolicy::Idle => self.last_used_at,
            ExpiryPolicy::Lifetime => self.created_at,
        };
        reference.checked_add(timeout)
    }

    /// Check if the connection is stale at `now`.
    #[must_use]
    pub fn is_stale_at(&self, policy: ExpiryPolicy, timeout: Duration, now: Instant) -> bool {
        match self.expires_at(policy, timeout) {
            Some(deadline) => deadline <= now,
            None => false,
        }
    }

    /// Check if the connection is stale now.
    #[must_use]
    pub fn is_stale(&self, policy: ExpiryPolicy, timeout: Duration) -> bool {
        self.is_stale_at(policy, timeout, Instant::now())
    }

    /// Mark the connection as handed out.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }
}

impl Default for ConnectionMetadata {
    fn default() -> Self {
        Self::new()
    }
}
