//! Managed connections.
//!
//! A [`ManagedConnection`] wraps a driver handle and runs every statement in
//! its own transaction envelope:
//!
//! ```text
//! fetch_one / fetch_all:  cursor -> execute -> fetch -> close cursor -> rollback
//! execute:                cursor -> execute -> commit -> close cursor
//!                                      \-> (failure) rollback -> close cursor
//! ```
//!
//! A failure to open the cursor still ends in a rollback.
//!
//! Cursor closes and rollbacks done for cleanup are best-effort; the outcome
//! of the statement itself is always what the caller sees.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cleanup::best_effort;
use crate::driver::{BoxError, ConnectionStatus, Cursor, RawConnection, TransactionStatus};
use crate::error::{Error, Result};
use crate::lifecycle::{ConnectionMetadata, ExpiryPolicy};

/// Health of a managed connection as seen by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Health {
    /// Closed by the caller, the pool or the peer.
    Closed,
    /// Open, ready and outside any transaction.
    Reusable,
    /// Open but mid-query or mid-transaction.
    Unusable {
        status: ConnectionStatus,
        transaction: TransactionStatus,
    },
}

/// A database connection with lifecycle metadata and transaction-safe
/// query helpers.
///
/// Handed out by the pool as `Arc<ManagedConnection<_>>`. A connection
/// belongs to the worker that requested it; the pool keeps its own reference
/// only to close it on eviction or reaping.
pub struct ManagedConnection<C: RawConnection> {
    raw: Mutex<Option<C>>,
    metadata: Mutex<ConnectionMetadata>,
}

impl<C: RawConnection> ManagedConnection<C> {
    pub(crate) fn new(raw: C) -> Self {
        Self {
            raw: Mutex::new(Some(raw)),
            metadata: Mutex::new(ConnectionMetadata::new()),
        }
    }

    /// Execute a statement and fetch a single row.
    ///
    /// Returns `None` when the statement produced no rows. Any transaction
    /// the statement opened is rolled back.
    pub fn fetch_one(&self, statement: &str, params: &C::Params) -> Result<Option<C::Row>> {
        self.with_open(|conn| {
            let result = with_cursor(
                conn,
                |_, cursor| {
                    cursor.execute(statement, params)?;
                    cursor.fetch_one()
                },
                |_, _| {},
            );
            best_effort("rollback", || conn.rollback());
            result.map_err(Error::Driver)
        })
    }

    /// Execute a statement and fetch all rows.
    ///
    /// Any transaction the statement opened is rolled back.
    pub fn fetch_all(&self, statement: &str, params: &C::Params) -> Result<Vec<C::Row>> {
        self.with_open(|conn| {
            let result = with_cursor(
                conn,
                |_, cursor| {
                    cursor.execute(statement, params)?;
                    cursor.fetch_all()
                },
                |_, _| {},
            );
            best_effort("rollback", || conn.rollback());
            result.map_err(Error::Driver)
        })
    }

    /// Execute a statement and commit it.
    ///
    /// Returns the number of affected rows. If the statement or the commit
    /// fails, the transaction is rolled back and the failure is returned.
    pub fn execute(&self, statement: &str, params: &C::Params) -> Result<u64> {
        self.with_open(|conn| {
            let result = with_cursor(
                conn,
                |conn, cursor| {
                    cursor.execute(statement, params)?;
                    conn.commit()?;
                    Ok(cursor.row_count())
                },
                |conn, e| {
                    tracing::debug!(error = %e, "statement failed, rolling back");
                    best_effort("rollback", || conn.rollback());
                },
            );
            result.map_err(Error::Driver)
        })
    }

    /// Close the connection.
    ///
    /// Never fails; closing an already closed connection does nothing.
    pub fn close(&self) {
        let raw = self.raw.lock().take();
        if let Some(mut raw) = raw {
            best_effort("close connection", || raw.close());
        }
    }

    /// Check if the connection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self.raw.lock().as_ref() {
            Some(raw) => raw.is_closed(),
            None => true,
        }
    }

    /// Connection status reported by the driver, or `None` once closed.
    #[must_use]
    pub fn status(&self) -> Option<ConnectionStatus> {
        self.raw.lock().as_ref().map(RawConnection::status)
    }

    /// Transaction status reported by the driver, or `None` once closed.
    #[must_use]
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.raw.lock().as_ref().map(RawConnection::transaction_status)
    }

    /// Run `f` against the raw driver handle.
    ///
    /// Work done here is outside the transaction envelope: whatever
    /// transaction `f` opens must be committed or rolled back before the
    /// worker asks the pool for its connection again.
    pub fn with_raw<T>(&self, f: impl FnOnce(&mut C) -> T) -> Result<T> {
        let mut raw = self.raw.lock();
        let conn = raw.as_mut().ok_or(Error::ConnectionClosed)?;
        Ok(f(conn))
    }

    /// Snapshot of the connection's lifecycle metadata.
    #[must_use]
    pub fn metadata(&self) -> ConnectionMetadata {
        self.metadata.lock().clone()
    }

    /// Time since the connection was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.metadata.lock().age()
    }

    /// Time since the pool last handed out the connection.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.metadata.lock().idle_time()
    }

    pub(crate) fn health(&self) -> Health {
        match self.raw.lock().as_ref() {
            None => Health::Closed,
            Some(raw) if raw.is_closed() => Health::Closed,
            Some(raw) => {
                let status = raw.status();
                let transaction = raw.transaction_status();
                if status == ConnectionStatus::Ready && transaction.is_idle() {
                    Health::Reusable
                } else {
                    Health::Unusable {
                        status,
                        transaction,
                    }
                }
            }
        }
    }

    pub(crate) fn is_stale(&self, policy: ExpiryPolicy, timeout: Duration) -> bool {
        self.metadata.lock().is_stale(policy, timeout)
    }

    pub(crate) fn mark_checkout(&self) {
        self.metadata.lock().mark_checkout();
    }

    fn with_open<T>(&self, f: impl FnOnce(&mut C) -> Result<T>) -> Result<T> {
        let mut raw = self.raw.lock();
        match raw.as_mut() {
            Some(conn) if !conn.is_closed() => f(conn),
            _ => Err(Error::ConnectionClosed),
        }
    }
}

/// Open a cursor, run `f` with it, and close it whatever the outcome.
///
/// `on_error` runs on any failure, including failing to open the cursor,
/// and always before the cursor is closed.
fn with_cursor<C, T, F, E>(
    conn: &mut C,
    f: F,
    on_error: E,
) -> std::result::Result<T, BoxError>
where
    C: RawConnection,
    F: FnOnce(&mut C, &mut C::Cursor) -> std::result::Result<T, BoxError>,
    E: FnOnce(&mut C, &BoxError),
{
    let mut cursor = match conn.cursor() {
        Ok(cursor) => cursor,
        Err(e) => {
            on_error(conn, &e);
            return Err(e);
        }
    };
    let result = f(conn, &mut cursor);
    if let Err(e) = &result {
        on_error(conn, e);
    }
    best_effort("close cursor", || cursor.close());
    result
}

impl<C: RawConnection> fmt::Debug for ManagedConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedConnection")
            .field("closed", &self.is_closed())
            .field("metadata", &self.metadata())
            .finish()
    }
}
