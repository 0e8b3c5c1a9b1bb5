//! Pool error types.

use thiserror::Error;

use crate::driver::{BoxError, ConnectionStatus, TransactionStatus};
use crate::worker::WorkerId;

/// Errors that can occur during pool and connection operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The driver failed while connecting, executing, fetching or committing.
    ///
    /// The driver's error is carried unchanged; use [`Error::driver_error`]
    /// to inspect or downcast it.
    #[error("driver error: {0}")]
    Driver(#[source] BoxError),

    /// A pooled connection was found mid-query or mid-transaction.
    ///
    /// This means a caller handed the connection back without finishing its
    /// work (for example, leaked an open transaction). The pool does not
    /// repair the connection; the calling code must be fixed.
    #[error(
        "pooled connection for worker {worker} is not reusable \
         (status: {status:?}, transaction: {transaction:?})"
    )]
    PoolState {
        /// Worker owning the connection.
        worker: WorkerId,
        /// Connection status reported by the driver.
        status: ConnectionStatus,
        /// Transaction status reported by the driver.
        transaction: TransactionStatus,
    },

    /// A query was issued on a connection that has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The calling thread's worker identity could not be obtained.
    ///
    /// Happens only while the thread is tearing down its thread-local state.
    #[error("worker identity unavailable during thread teardown")]
    WorkerUnavailable,
}

impl Error {
    /// Wrap a driver failure.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        Self::Driver(err.into())
    }

    /// Get the underlying driver error, if this is a driver failure.
    #[must_use]
    pub fn driver_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Self::Driver(err) => Some(err.as_ref()),
            _ => None,
        }
    }

    /// Check if this error signals misuse of a pooled connection.
    #[must_use]
    pub fn is_pool_state(&self) -> bool {
        matches!(self, Self::PoolState { .. })
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
