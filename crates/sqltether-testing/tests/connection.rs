//! Managed connection tests.
//!
//! Exercise the transaction envelope of `fetch_one`, `fetch_all` and
//! `execute` against the mock driver: cursor cleanup, commit/rollback and
//! error propagation on both success and failure paths.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use sqltether::{Error, Pool, PoolConfig, PooledConnection, TransactionStatus};
use sqltether_testing::{ManualRegistry, MockDriver, MockError, MockFault, MockResponse, MockValue};

fn users_driver() -> MockDriver {
    MockDriver::builder()
        .with_table(
            "users",
            vec![
                vec![MockValue::Int(1), MockValue::from("alice")],
                vec![MockValue::Int(2), MockValue::from("bob")],
            ],
        )
        .with_response("select * from users", MockResponse::table("users"))
        .with_response("select * from nobody", MockResponse::empty())
        .with_response(
            "select name from users where id = $1",
            MockResponse::query(|store, params| {
                store
                    .rows("users")
                    .into_iter()
                    .filter(|row| row.first() == params.first())
                    .map(|row| vec![row[1].clone()])
                    .collect()
            }),
        )
        .with_response(
            "insert into users values ($1, $2)",
            MockResponse::write(|store, params| {
                store.table_mut("users").push(params.to_vec());
                1
            }),
        )
        .with_response(
            "delete from users",
            MockResponse::write(|store, _| {
                let rows = store.table_mut("users");
                let count = rows.len() as u64;
                rows.clear();
                count
            }),
        )
        .with_response(
            "select * from missing",
            MockResponse::error("relation \"missing\" does not exist"),
        )
        .build()
}

fn connection(driver: &MockDriver) -> PooledConnection<MockDriver> {
    let registry = Arc::new(ManualRegistry::new());
    let pool = Pool::new(
        "dbname=test",
        PoolConfig::new(),
        Arc::new(driver.clone()),
        Arc::clone(&registry),
    );
    pool.get(registry.spawn()).unwrap()
}

fn mock_message(err: &Error) -> String {
    err.driver_error()
        .and_then(|e| e.downcast_ref::<MockError>())
        .map(|e| e.message.clone())
        .expect("expected a mock driver error")
}

// =============================================================================
// fetch_one / fetch_all
// =============================================================================

#[test]
fn test_fetch_one_returns_first_row() {
    let driver = users_driver();
    let conn = connection(&driver);

    let row = conn
        .fetch_one("select name from users where id = $1", &[MockValue::Int(2)])
        .unwrap();
    assert_eq!(row, Some(vec![MockValue::from("bob")]));
}

#[test]
fn test_fetch_one_returns_none_without_rows() {
    let driver = users_driver();
    let conn = connection(&driver);

    assert_eq!(conn.fetch_one("select * from nobody", &[]).unwrap(), None);
}

#[test]
fn test_fetch_all_returns_rows_in_order() {
    let driver = users_driver();
    let conn = connection(&driver);

    let rows = conn.fetch_all("select * from users", &[]).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1], MockValue::from("alice"));
    assert_eq!(rows[1][1], MockValue::from("bob"));
}

#[test]
fn test_fetch_closes_cursor_and_rolls_back() {
    let driver = users_driver();
    let conn = connection(&driver);

    conn.fetch_all("select * from users", &[]).unwrap();
    conn.fetch_one("select * from users", &[]).unwrap();

    let stats = driver.stats();
    assert_eq!(stats.cursors_opened, 2);
    assert_eq!(stats.open_cursors, 0);
    assert_eq!(stats.rollbacks, 2);
    assert_eq!(stats.commits, 0);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));
}

#[test]
fn test_fetch_all_failure_is_surfaced_after_cleanup() {
    let driver = users_driver();
    let conn = connection(&driver);

    let err = conn.fetch_all("select * from missing", &[]).unwrap_err();
    assert_eq!(mock_message(&err), "relation \"missing\" does not exist");

    let stats = driver.stats();
    assert_eq!(stats.open_cursors, 0);
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));
}

#[test]
fn test_fetch_one_failure_is_surfaced_after_cleanup() {
    let driver = users_driver();
    let conn = connection(&driver);

    let err = conn.fetch_one("select * from missing", &[]).unwrap_err();
    assert!(matches!(err, Error::Driver(_)));
    assert_eq!(driver.stats().open_cursors, 0);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));

    // The connection stays usable after a failed statement.
    assert_eq!(conn.fetch_all("select * from users", &[]).unwrap().len(), 2);
}

#[test]
fn test_fetch_discards_writes_made_by_statement() {
    let driver = users_driver();
    let conn = connection(&driver);

    // A write issued through a fetch helper is rolled back, not committed.
    let err = conn
        .fetch_all("delete from users", &[])
        .expect_err("writes produce no result set");
    assert!(mock_message(&err).contains("no results"));
    assert_eq!(driver.store().rows("users").len(), 2);
}

#[test]
fn test_fetch_swallows_rollback_failure() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Rollback, true);

    let rows = conn.fetch_all("select * from users", &[]).unwrap();
    assert_eq!(rows.len(), 2);
    // The implicit transaction could not be ended.
    assert_eq!(
        conn.transaction_status(),
        Some(TransactionStatus::InTransaction)
    );
}

#[test]
fn test_fetch_swallows_cursor_close_failure() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::CursorClose, true);

    assert!(conn.fetch_one("select * from users", &[]).unwrap().is_some());
    assert_eq!(driver.stats().open_cursors, 0);
}

// =============================================================================
// execute
// =============================================================================

#[test]
fn test_execute_commits_and_returns_row_count() {
    let driver = users_driver();
    let conn = connection(&driver);

    let count = conn
        .execute(
            "insert into users values ($1, $2)",
            &[MockValue::Int(3), MockValue::from("carol")],
        )
        .unwrap();
    assert_eq!(count, 1);

    let stats = driver.stats();
    assert_eq!(stats.commits, 1);
    assert_eq!(stats.rollbacks, 0);
    assert_eq!(stats.open_cursors, 0);
    assert_eq!(driver.store().rows("users").len(), 3);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));
}

#[test]
fn test_execute_reports_multi_row_count() {
    let driver = users_driver();
    let conn = connection(&driver);

    assert_eq!(conn.execute("delete from users", &[]).unwrap(), 2);
    assert!(driver.store().rows("users").is_empty());
}

#[test]
fn test_execute_failure_rolls_back_and_surfaces_error() {
    let driver = users_driver();
    let conn = connection(&driver);

    let err = conn.execute("select * from missing", &[]).unwrap_err();
    assert_eq!(mock_message(&err), "relation \"missing\" does not exist");

    let stats = driver.stats();
    assert_eq!(stats.commits, 0);
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.open_cursors, 0);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));
}

#[test]
fn test_execute_commit_failure_rolls_back() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Commit, true);

    let err = conn.execute("delete from users", &[]).unwrap_err();
    assert_eq!(mock_message(&err), "could not serialize access");

    assert_eq!(driver.store().rows("users").len(), 2);
    assert_eq!(driver.stats().rollbacks, 1);
    assert_eq!(driver.stats().open_cursors, 0);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));
}

#[test]
fn test_execute_keeps_original_error_when_rollback_fails() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Rollback, true);

    let err = conn.execute("select * from missing", &[]).unwrap_err();
    assert_eq!(mock_message(&err), "relation \"missing\" does not exist");
    assert_eq!(driver.stats().open_cursors, 0);
}

#[test]
fn test_execute_swallows_cursor_close_failure() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::CursorClose, true);

    assert_eq!(conn.execute("delete from users", &[]).unwrap(), 2);
    assert_eq!(driver.stats().commits, 1);
}

#[test]
fn test_execute_rolls_back_before_closing_cursor() {
    let driver = users_driver();
    let conn = connection(&driver);

    conn.execute("select * from missing", &[]).unwrap_err();
    assert_eq!(driver.calls(), vec!["cursor", "rollback", "close cursor"]);
}

#[test]
fn test_execute_commits_before_closing_cursor() {
    let driver = users_driver();
    let conn = connection(&driver);

    conn.execute("delete from users", &[]).unwrap();
    assert_eq!(driver.calls(), vec!["cursor", "commit", "close cursor"]);
}

#[test]
fn test_fetch_closes_cursor_before_rollback() {
    let driver = users_driver();
    let conn = connection(&driver);

    conn.fetch_all("select * from users", &[]).unwrap();
    assert_eq!(driver.calls(), vec!["cursor", "close cursor", "rollback"]);
}

// =============================================================================
// Cursor creation failure
// =============================================================================

#[test]
fn test_fetch_one_cursor_failure_is_driver_error() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Cursor, true);

    let err = conn.fetch_one("select * from users", &[]).unwrap_err();
    assert_eq!(mock_message(&err), "out of memory for cursor");

    let stats = driver.stats();
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.open_cursors, 0);
    assert_eq!(stats.cursors_opened, 0);
}

#[test]
fn test_fetch_all_cursor_failure_is_driver_error() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Cursor, true);

    let err = conn.fetch_all("select * from users", &[]).unwrap_err();
    assert!(matches!(err, Error::Driver(_)));

    let stats = driver.stats();
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.open_cursors, 0);
}

#[test]
fn test_execute_cursor_failure_rolls_back() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Cursor, true);

    let err = conn.execute("delete from users", &[]).unwrap_err();
    assert_eq!(mock_message(&err), "out of memory for cursor");

    let stats = driver.stats();
    assert_eq!(stats.rollbacks, 1);
    assert_eq!(stats.commits, 0);
    assert_eq!(stats.open_cursors, 0);
    assert_eq!(driver.store().rows("users").len(), 2);

    // The connection recovers once cursors can be opened again.
    driver.set_fault(MockFault::Cursor, false);
    assert_eq!(conn.execute("delete from users", &[]).unwrap(), 2);
}

// =============================================================================
// close
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let driver = users_driver();
    let conn = connection(&driver);

    conn.close();
    conn.close();

    assert!(conn.is_closed());
    assert_eq!(conn.status(), None);
    assert_eq!(conn.transaction_status(), None);
    assert_eq!(driver.stats().connections_closed, 1);
}

#[test]
fn test_close_swallows_driver_failure() {
    let driver = users_driver();
    let conn = connection(&driver);
    driver.set_fault(MockFault::Close, true);

    conn.close();
    assert!(conn.is_closed());
}

#[test]
fn test_queries_fail_after_close() {
    let driver = users_driver();
    let conn = connection(&driver);
    conn.close();

    assert!(matches!(
        conn.fetch_one("select * from users", &[]),
        Err(Error::ConnectionClosed)
    ));
    assert!(matches!(
        conn.fetch_all("select * from users", &[]),
        Err(Error::ConnectionClosed)
    ));
    assert!(matches!(
        conn.execute("delete from users", &[]),
        Err(Error::ConnectionClosed)
    ));
    assert!(matches!(conn.with_raw(|_| ()), Err(Error::ConnectionClosed)));
    assert_eq!(driver.stats().cursors_opened, 0);
}

#[test]
fn test_queries_fail_after_server_disconnect() {
    let driver = users_driver();
    let conn = connection(&driver);
    conn.with_raw(|raw| raw.disconnect()).unwrap();

    assert!(conn.is_closed());
    assert!(matches!(
        conn.fetch_all("select * from users", &[]),
        Err(Error::ConnectionClosed)
    ));
}
