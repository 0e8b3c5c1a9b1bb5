//! Per-worker connection example.
//!
//! Spawns a handful of worker threads that share one pool directory. Each
//! worker gets its own connection, runs a few statements through it, and
//! exits. The main thread then connects again, which reaps the connections
//! left behind by the exited workers.
//!
//! The example runs against the in-memory mock driver, so no database is
//! needed.
//!
//! # Running
//!
//! ```bash
//! RUST_LOG=debug cargo run -p sqltether-testing --example per_worker
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sqltether::{Error, PoolDirectory};
use sqltether_testing::{MockDriver, MockResponse, MockValue};

const TARGET: &str = "dbname=demo user=app password=secret";

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqltether=debug".into()),
        )
        .init();

    let driver = MockDriver::builder()
        .with_table("visits", Vec::new())
        .with_response("select * from visits", MockResponse::table("visits"))
        .with_response(
            "insert into visits values ($1)",
            MockResponse::write(|store, params| {
                store.table_mut("visits").push(params.to_vec());
                1
            }),
        )
        .build();

    let directory = Arc::new(PoolDirectory::new(driver.clone()));

    let workers: Vec<_> = (0..4_i64)
        .map(|n| {
            let directory = Arc::clone(&directory);
            thread::spawn(move || -> Result<(), Error> {
                let conn = directory.connect(TARGET, Duration::from_secs(60))?;
                for _ in 0..3 {
                    conn.execute("insert into visits values ($1)", &[MockValue::Int(n)])?;
                }
                let seen = conn.fetch_all("select * from visits", &[])?.len();
                println!("worker {n}: {seen} visits so far");
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker thread panicked")?;
    }

    // Connecting from the main thread reaps the exited workers' connections.
    let conn = directory.connect(TARGET, Duration::from_secs(60))?;
    let total = conn.fetch_all("select * from visits", &[])?.len();

    let pool = directory.get(TARGET).expect("pool was created above");
    println!("total visits: {total}");
    println!("pool status: {:?}", pool.status());
    println!("driver stats: {:?}", driver.stats());

    pool.close_all();
    Ok(())
}
