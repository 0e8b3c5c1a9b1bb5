//! Driver boundary.
//!
//! The pool never speaks a wire protocol itself. It manages handles obtained
//! from a database client library through the traits in this module:
//!
//! ```text
//! Driver::connect(target) -> RawConnection
//! RawConnection::cursor() -> Cursor
//! Cursor::execute / fetch_one / fetch_all / row_count / close
//! RawConnection::commit / rollback / close / status / transaction_status
//! ```
//!
//! All calls are blocking. Failures are reported as [`BoxError`] and are
//! surfaced to callers unchanged inside [`Error::Driver`](crate::Error::Driver).

/// Boxed driver error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Connection status reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The connection can accept a new statement.
    Ready,
    /// A statement is in flight or results are pending.
    Busy,
}

/// Transaction status reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No transaction is open.
    Idle,
    /// A command is currently executing.
    Active,
    /// Inside a valid transaction block.
    InTransaction,
    /// Inside a failed transaction block.
    InError,
    /// The connection is bad or the status cannot be determined.
    Unknown,
}

impl TransactionStatus {
    /// Check if no transaction is open.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Factory for raw connections.
pub trait Driver: Send + Sync + 'static {
    /// Connection handle produced by this driver.
    type Connection: RawConnection;

    /// Open a new connection to `target` (a connection string).
    fn connect(&self, target: &str) -> Result<Self::Connection, BoxError>;
}

/// A raw database connection handle.
///
/// Statements run through cursors. A statement may implicitly open a
/// transaction which stays open until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
pub trait RawConnection: Send + 'static {
    /// Cursor type.
    type Cursor: Cursor<Row = Self::Row, Params = Self::Params>;
    /// Row type produced by fetches.
    type Row: Send;
    /// Statement parameter type.
    type Params: ?Sized;

    /// Open a cursor.
    fn cursor(&mut self) -> Result<Self::Cursor, BoxError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), BoxError>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), BoxError>;

    /// Close the connection.
    fn close(&mut self) -> Result<(), BoxError>;

    /// Check if the connection has been closed, by either side.
    fn is_closed(&self) -> bool;

    /// Current connection status.
    fn status(&self) -> ConnectionStatus;

    /// Current transaction status.
    fn transaction_status(&self) -> TransactionStatus;
}

/// A cursor opened on a [`RawConnection`].
pub trait Cursor {
    /// Row type.
    type Row;
    /// Statement parameter type.
    type Params: ?Sized;

    /// Execute a statement.
    fn execute(&mut self, statement: &str, params: &Self::Params) -> Result<(), BoxError>;

    /// Fetch the next row, or `None` when the result set is exhausted.
    fn fetch_one(&mut self) -> Result<Option<Self::Row>, BoxError>;

    /// Fetch all remaining rows.
    fn fetch_all(&mut self) -> Result<Vec<Self::Row>, BoxError>;

    /// Number of rows affected by the last statement.
    fn row_count(&self) -> u64;

    /// Close the cursor.
    fn close(&mut self) -> Result<(), BoxError>;
}
