//! In-memory mock driver for unit testing.
//!
//! This module provides a scripted database driver that can be used to test
//! pool and connection behavior without a real database server.
//!
//! ## Features
//!
//! - Configurable responses per SQL statement
//! - Implicit transactions: writes are staged per connection and applied to
//!   the shared store on commit, discarded on rollback
//! - Fault injection for connect, commit, rollback, cursor close and close
//! - Counters for connections, cursors, commits and rollbacks
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqltether_testing::mock_driver::{MockDriver, MockResponse, MockValue};
//!
//! let driver = MockDriver::builder()
//!     .with_table("t", vec![vec![MockValue::Int(0)]])
//!     .with_response("select * from t", MockResponse::table("t"))
//!     .build();
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use sqltether::{BoxError, ConnectionStatus, Cursor, Driver, RawConnection, TransactionStatus};
use thiserror::Error;

/// Error returned by the mock driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct MockError {
    /// Error message.
    pub message: String,
}

impl MockError {
    fn boxed(message: impl Into<String>) -> BoxError {
        Box::new(Self {
            message: message.into(),
        })
    }
}

/// A value in a mock row or statement parameter list.
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    /// SQL NULL.
    Null,
    /// Integer value.
    Int(i64),
    /// Text value.
    Text(String),
    /// Boolean value.
    Bool(bool),
}

impl From<i64> for MockValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for MockValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for MockValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for MockValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A mock row.
pub type MockRow = Vec<MockValue>;

/// Committed data visible to every mock connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockStore {
    tables: HashMap<String, Vec<MockRow>>,
}

impl MockStore {
    /// Rows of `table`; empty if the table does not exist.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<MockRow> {
        self.tables.get(table).cloned().unwrap_or_default()
    }

    /// Mutable access to the rows of `table`, creating it if missing.
    pub fn table_mut(&mut self, table: &str) -> &mut Vec<MockRow> {
        self.tables.entry(table.to_owned()).or_default()
    }
}

type ReadFn = Arc<dyn Fn(&MockStore, &[MockValue]) -> Vec<MockRow> + Send + Sync>;
type WriteFn = Arc<dyn Fn(&mut MockStore, &[MockValue]) -> u64 + Send + Sync>;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return fixed rows.
    Rows(Vec<MockRow>),

    /// Compute rows from the committed store.
    Query(ReadFn),

    /// Stage a write; returns the affected row count.
    Write(WriteFn),

    /// Fail the statement with this message.
    Error(String),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(rows) => f.debug_tuple("Rows").field(rows).finish(),
            Self::Query(_) => f.debug_tuple("Query").field(&"<fn>").finish(),
            Self::Write(_) => f.debug_tuple("Write").field(&"<fn>").finish(),
            Self::Error(message) => f.debug_tuple("Error").field(message).finish(),
        }
    }
}

impl MockResponse {
    /// Return fixed rows.
    #[must_use]
    pub fn rows(rows: Vec<MockRow>) -> Self {
        Self::Rows(rows)
    }

    /// Return no rows.
    #[must_use]
    pub fn empty() -> Self {
        Self::Rows(Vec::new())
    }

    /// Return all committed rows of `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        let table = table.into();
        Self::query(move |store, _| store.rows(&table))
    }

    /// Compute rows from the committed store and the statement parameters.
    pub fn query<F>(f: F) -> Self
    where
        F: Fn(&MockStore, &[MockValue]) -> Vec<MockRow> + Send + Sync + 'static,
    {
        Self::Query(Arc::new(f))
    }

    /// Stage a write computed from the store and the statement parameters.
    pub fn write<F>(f: F) -> Self
    where
        F: Fn(&mut MockStore, &[MockValue]) -> u64 + Send + Sync + 'static,
    {
        Self::Write(Arc::new(f))
    }

    /// Stage a write that changes nothing but reports `count` affected rows.
    #[must_use]
    pub fn rows_affected(count: u64) -> Self {
        Self::write(move |_, _| count)
    }

    /// Fail the statement.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }
}

/// Operations whose failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFault {
    /// `Driver::connect` fails.
    Connect,
    /// `RawConnection::commit` fails.
    Commit,
    /// `RawConnection::rollback` fails.
    Rollback,
    /// `RawConnection::cursor` fails.
    Cursor,
    /// `Cursor::close` fails (the cursor is still released).
    CursorClose,
    /// `RawConnection::close` fails (the connection is still closed).
    Close,
}

#[derive(Debug, Default)]
struct Faults {
    connect: AtomicBool,
    commit: AtomicBool,
    rollback: AtomicBool,
    cursor: AtomicBool,
    cursor_close: AtomicBool,
    close: AtomicBool,
}

impl Faults {
    fn flag(&self, fault: MockFault) -> &AtomicBool {
        match fault {
            MockFault::Connect => &self.connect,
            MockFault::Commit => &self.commit,
            MockFault::Rollback => &self.rollback,
            MockFault::Cursor => &self.cursor,
            MockFault::CursorClose => &self.cursor_close,
            MockFault::Close => &self.close,
        }
    }

    fn is_set(&self, fault: MockFault) -> bool {
        self.flag(fault).load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Counters {
    connections_opened: AtomicUsize,
    connections_closed: AtomicUsize,
    cursors_opened: AtomicUsize,
    open_cursors: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Snapshot of mock driver activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockStats {
    /// Connections opened through the driver.
    pub connections_opened: usize,
    /// Connections closed through `RawConnection::close`.
    pub connections_closed: usize,
    /// Cursors opened.
    pub cursors_opened: usize,
    /// Cursors opened and not yet closed.
    pub open_cursors: usize,
    /// Successful commits.
    pub commits: usize,
    /// Successful rollbacks.
    pub rollbacks: usize,
}

struct Shared {
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
    store: Mutex<MockStore>,
    faults: Faults,
    counters: Counters,
    statements: Mutex<Vec<String>>,
    calls: Mutex<Vec<&'static str>>,
    targets: Mutex<Vec<String>>,
    next_connection_id: AtomicU64,
}

impl Shared {
    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }

    fn response(&self, statement: &str) -> Option<MockResponse> {
        self.responses
            .get(statement)
            .or_else(|| self.responses.get(statement.trim()))
            .or(self.default_response.as_ref())
            .cloned()
    }
}

/// Builder for [`MockDriver`].
#[derive(Default)]
pub struct MockDriverBuilder {
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
    store: MockStore,
}

impl MockDriverBuilder {
    /// Create a new builder with no responses and an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for a specific SQL statement.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }

    /// Set the response for unmatched statements.
    ///
    /// Without one, unmatched statements fail.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Seed a table in the committed store.
    #[must_use]
    pub fn with_table(mut self, table: &str, rows: Vec<MockRow>) -> Self {
        *self.store.table_mut(table) = rows;
        self
    }

    /// Build the driver.
    #[must_use]
    pub fn build(self) -> MockDriver {
        MockDriver {
            shared: Arc::new(Shared {
                responses: self.responses,
                default_response: self.default_response,
                store: Mutex::new(self.store),
                faults: Faults::default(),
                counters: Counters::default(),
                statements: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                targets: Mutex::new(Vec::new()),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }
}

/// Scripted in-memory database driver.
///
/// Clones share responses, data, faults and counters.
#[derive(Clone)]
pub struct MockDriver {
    shared: Arc<Shared>,
}

impl MockDriver {
    /// Create a builder.
    #[must_use]
    pub fn builder() -> MockDriverBuilder {
        MockDriverBuilder::new()
    }

    /// Enable or disable an injected fault.
    pub fn set_fault(&self, fault: MockFault, enabled: bool) {
        self.shared.faults.flag(fault).store(enabled, Ordering::SeqCst);
    }

    /// Snapshot of driver activity.
    #[must_use]
    pub fn stats(&self) -> MockStats {
        let c = &self.shared.counters;
        MockStats {
            connections_opened: c.connections_opened.load(Ordering::SeqCst),
            connections_closed: c.connections_closed.load(Ordering::SeqCst),
            cursors_opened: c.cursors_opened.load(Ordering::SeqCst),
            open_cursors: c.open_cursors.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
        }
    }

    /// Copy of the committed store.
    #[must_use]
    pub fn store(&self) -> MockStore {
        self.shared.store.lock().clone()
    }

    /// Statements executed so far, in order.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.shared.statements.lock().clone()
    }

    /// Cursor and transaction calls that took effect, in order.
    ///
    /// One of `"cursor"`, `"commit"`, `"rollback"`, `"close cursor"`.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.shared.calls.lock().clone()
    }

    /// Targets passed to `connect`, in order.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        self.shared.targets.lock().clone()
    }
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDriver")
            .field("responses", &self.shared.responses.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn connect(&self, target: &str) -> Result<MockConnection, BoxError> {
        if self.shared.faults.is_set(MockFault::Connect) {
            return Err(MockError::boxed(format!("could not connect to {target}")));
        }
        self.shared.targets.lock().push(target.to_owned());
        self.shared
            .counters
            .connections_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(MockConnection {
            id: self.shared.next_connection_id.fetch_add(1, Ordering::SeqCst),
            shared: Arc::clone(&self.shared),
            state: Arc::new(Mutex::new(ConnState::default())),
        })
    }
}

struct ConnState {
    status: ConnectionStatus,
    transaction: TransactionStatus,
    closed: bool,
    pending: Vec<(WriteFn, Vec<MockValue>)>,
}

impl Default for ConnState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Ready,
            transaction: TransactionStatus::Idle,
            closed: false,
            pending: Vec::new(),
        }
    }
}

/// Connection produced by [`MockDriver`].
pub struct MockConnection {
    id: u64,
    shared: Arc<Shared>,
    state: Arc<Mutex<ConnState>>,
}

impl MockConnection {
    /// Serial number of this connection within its driver, starting at 1.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Open a transaction without finishing it, as a leaky caller would.
    pub fn begin(&mut self) {
        self.state.lock().transaction = TransactionStatus::InTransaction;
    }

    /// Force the reported connection status.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.state.lock().status = status;
    }

    /// Force the reported transaction status.
    pub fn set_transaction_status(&mut self, transaction: TransactionStatus) {
        self.state.lock().transaction = transaction;
    }

    /// Simulate the server dropping the connection.
    pub fn disconnect(&mut self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.transaction = TransactionStatus::Unknown;
    }
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection").field("id", &self.id).finish()
    }
}

impl RawConnection for MockConnection {
    type Cursor = MockCursor;
    type Row = MockRow;
    type Params = [MockValue];

    fn cursor(&mut self) -> Result<MockCursor, BoxError> {
        if self.state.lock().closed {
            return Err(MockError::boxed("connection already closed"));
        }
        if self.shared.faults.is_set(MockFault::Cursor) {
            return Err(MockError::boxed("out of memory for cursor"));
        }
        let counters = &self.shared.counters;
        counters.cursors_opened.fetch_add(1, Ordering::SeqCst);
        counters.open_cursors.fetch_add(1, Ordering::SeqCst);
        self.shared.record("cursor");
        Ok(MockCursor {
            shared: Arc::clone(&self.shared),
            state: Arc::clone(&self.state),
            results: None,
            row_count: 0,
            closed: false,
        })
    }

    fn commit(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MockError::boxed("connection already closed"));
        }
        if self.shared.faults.is_set(MockFault::Commit) {
            state.transaction = TransactionStatus::InError;
            return Err(MockError::boxed("could not serialize access"));
        }
        let pending = std::mem::take(&mut state.pending);
        let mut store = self.shared.store.lock();
        for (write, params) in pending {
            write(&mut *store, params.as_slice());
        }
        state.transaction = TransactionStatus::Idle;
        self.shared.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.shared.record("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(MockError::boxed("connection already closed"));
        }
        if self.shared.faults.is_set(MockFault::Rollback) {
            return Err(MockError::boxed("rollback failed"));
        }
        state.pending.clear();
        state.transaction = TransactionStatus::Idle;
        self.shared.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.shared.record("rollback");
        Ok(())
    }

    fn close(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.pending.clear();
            self.shared
                .counters
                .connections_closed
                .fetch_add(1, Ordering::SeqCst);
        }
        if self.shared.faults.is_set(MockFault::Close) {
            return Err(MockError::boxed("error closing connection"));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }

    fn transaction_status(&self) -> TransactionStatus {
        let state = self.state.lock();
        if state.closed {
            TransactionStatus::Unknown
        } else {
            state.transaction
        }
    }
}

/// Cursor produced by [`MockConnection`].
pub struct MockCursor {
    shared: Arc<Shared>,
    state: Arc<Mutex<ConnState>>,
    results: Option<VecDeque<MockRow>>,
    row_count: u64,
    closed: bool,
}

impl Cursor for MockCursor {
    type Row = MockRow;
    type Params = [MockValue];

    fn execute(&mut self, statement: &str, params: &[MockValue]) -> Result<(), BoxError> {
        if self.closed {
            return Err(MockError::boxed("cursor already closed"));
        }
        let mut state = self.state.lock();
        if state.closed {
            return Err(MockError::boxed("connection already closed"));
        }
        if state.transaction == TransactionStatus::InError {
            return Err(MockError::boxed(
                "current transaction is aborted, commands ignored until end of transaction block",
            ));
        }
        self.shared.statements.lock().push(statement.to_owned());
        state.transaction = TransactionStatus::InTransaction;
        self.results = None;
        self.row_count = 0;

        let Some(response) = self.shared.response(statement) else {
            state.transaction = TransactionStatus::InError;
            return Err(MockError::boxed(format!(
                "no mock response for statement: {statement}"
            )));
        };

        match response {
            MockResponse::Rows(rows) => {
                self.row_count = rows.len() as u64;
                self.results = Some(rows.into());
            }
            MockResponse::Query(read) => {
                let rows = read(&*self.shared.store.lock(), params);
                self.row_count = rows.len() as u64;
                self.results = Some(rows.into());
            }
            MockResponse::Write(write) => {
                let mut scratch = self.shared.store.lock().clone();
                for (staged, staged_params) in &state.pending {
                    staged(&mut scratch, staged_params.as_slice());
                }
                self.row_count = write(&mut scratch, params);
                state.pending.push((write, params.to_vec()));
            }
            MockResponse::Error(message) => {
                state.transaction = TransactionStatus::InError;
                return Err(MockError::boxed(message));
            }
        }
        Ok(())
    }

    fn fetch_one(&mut self) -> Result<Option<MockRow>, BoxError> {
        match self.results.as_mut() {
            Some(rows) => Ok(rows.pop_front()),
            None => Err(MockError::boxed("no results to fetch")),
        }
    }

    fn fetch_all(&mut self) -> Result<Vec<MockRow>, BoxError> {
        match self.results.as_mut() {
            Some(rows) => Ok(rows.drain(..).collect()),
            None => Err(MockError::boxed("no results to fetch")),
        }
    }

    fn row_count(&self) -> u64 {
        self.row_count
    }

    fn close(&mut self) -> Result<(), BoxError> {
        if !self.closed {
            self.closed = true;
            self.shared
                .counters
                .open_cursors
                .fetch_sub(1, Ordering::SeqCst);
            self.shared.record("close cursor");
        }
        if self.shared.faults.is_set(MockFault::CursorClose) {
            return Err(MockError::boxed("error closing cursor"));
        }
        Ok(())
    }
}
