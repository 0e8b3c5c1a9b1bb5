//! # sqltether-testing
//!
//! Test infrastructure for sqltether.
//!
//! This crate provides a scripted in-memory database driver and a manually
//! driven worker registry, so pool behavior can be tested without a
//! database server and without depending on thread scheduling.
//!
//! ## Features
//!
//! - Mock driver with per-statement responses and staged transactions
//! - Fault injection for connect, commit, rollback and close paths
//! - Cursor, commit and rollback counters for leak checks
//! - Worker registry whose workers start and exit on demand
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sqltether::{Pool, PoolConfig};
//! use sqltether_testing::{ManualRegistry, MockDriver, MockResponse};
//!
//! let driver = MockDriver::builder()
//!     .with_response("select 1", MockResponse::rows(vec![vec![1.into()]]))
//!     .build();
//! let registry = Arc::new(ManualRegistry::new());
//! let pool = Pool::new("dbname=test", PoolConfig::new(), Arc::new(driver), registry.clone());
//!
//! let worker = registry.spawn();
//! let conn = pool.get(worker)?;
//! assert_eq!(conn.fetch_one("select 1", &[])?, Some(vec![1.into()]));
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod mock_driver;
pub mod registry;

pub use mock_driver::{
    MockConnection, MockCursor, MockDriver, MockDriverBuilder, MockError, MockFault, MockResponse,
    MockRow, MockStats, MockStore, MockValue,
};
pub use registry::ManualRegistry;
