//! # sqltether
//!
//! Per-worker connection pooling for blocking SQL database drivers.
//!
//! Every worker thread gets its own database connection, created on first
//! use and reused until it goes stale. Connections of threads that have
//! exited are closed and dropped the next time any worker asks for a
//! connection. Query helpers wrap every statement in its own transaction so
//! a connection is always idle when it goes back to the pool.
//!
//! ## Features
//!
//! - One connection per worker, keyed by thread identity
//! - Idle or absolute-lifetime expiry, configurable per pool
//! - Fail-fast detection of connections leaked mid-transaction
//! - Inline reaping of connections owned by exited threads
//! - Transaction-safe `fetch_one`, `fetch_all` and `execute` helpers
//! - Driver-agnostic: plug any blocking client in through [`Driver`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use sqltether::PoolDirectory;
//!
//! let directory = PoolDirectory::new(driver);
//!
//! let conn = directory.connect("dbname=test user=app", Duration::from_secs(3600))?;
//! let users = conn.fetch_all("select * from users", &[])?;
//! let updated = conn.execute("update users set active = $1", &[true.into()])?;
//! conn.close();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod cleanup;
pub mod config;
pub mod connection;
pub mod directory;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod worker;

pub use config::{DEFAULT_TIMEOUT, PoolConfig};
pub use connection::ManagedConnection;
pub use directory::PoolDirectory;
pub use driver::{BoxError, ConnectionStatus, Cursor, Driver, RawConnection, TransactionStatus};
pub use error::{Error, Result};
pub use lifecycle::{ConnectionMetadata, ExpiryPolicy};
pub use pool::{Pool, PoolStatus, PooledConnection};
pub use worker::{ThreadRegistry, WorkerId, WorkerRegistry};
