#![allow(dead_code)]

#[path = "../src/error.rs"]
mod error;
#[path = "../src/retry.rs"]
mod retry;

use std::time::Duration;

use error::{is_transient_sqlite, CoreError};
use retry::{run_in_transaction, run_retryable, RetryPolicy};

#[derive(Debug, PartialEq)]
enum TestErr {
    Transient,
    Fatal,
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

#[test]
fn first_try_success_runs_once() {
    let mut calls = 0;
    let out: Result<i32, TestErr> =
        run_retryable(&fast_policy(), |e| *e == TestErr::Transient, |_| {
            calls += 1;
            Ok(7)
        });
    assert_eq!(out.unwrap(), 7);
    assert_eq!(calls, 1);
}

#[test]
fn transient_failures_are_retried_until_success() {
    let mut calls = 0;
    let out: Result<i32, TestErr> =
        run_retryable(&fast_policy(), |e| *e == TestErr::Transient, |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(TestErr::Transient)
            } else {
                Ok(42)
            }
        });
    assert_eq!(out.unwrap(), 42);
    assert_eq!(calls, 3);
}

#[test]
fn exhausted_retries_surface_the_last_transient_error() {
    let mut calls = 0;
    let out: Result<(), TestErr> =
        run_retryable(&fast_policy(), |e| *e == TestErr::Transient, |_| {
            calls += 1;
            Err(TestErr::Transient)
        });
    assert_eq!(out.unwrap_err(), TestErr::Transient);
    assert_eq!(calls, 3);
}

#[test]
fn non_transient_errors_abort_immediately() {
    let mut calls = 0;
    let out: Result<(), TestErr> =
        run_retryable(&fast_policy(), |e| *e == TestErr::Transient, |_| {
            calls += 1;
            Err(TestErr::Fatal)
        });
    assert_eq!(out.unwrap_err(), TestErr::Fatal);
    assert_eq!(calls, 1);
}

#[test]
fn backoff_grows_linearly_with_the_attempt() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1000),
    };
    assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    assert_eq!(policy.delay_for(3), Duration::from_millis(3000));
}

#[test]
fn busy_and_locked_are_the_transient_class() {
    let busy = rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
        None,
    );
    let locked = rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
        None,
    );
    let constraint = rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
        None,
    );
    assert!(is_transient_sqlite(&busy));
    assert!(is_transient_sqlite(&locked));
    assert!(!is_transient_sqlite(&constraint));

    assert!(CoreError::from(busy).is_transient());
    assert!(!CoreError::from(constraint_clone()).is_transient());
}

fn constraint_clone() -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
        None,
    )
}

#[test]
fn transaction_commits_on_success() {
    let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)", [])
        .expect("create table");

    let out = run_in_transaction(&conn, &fast_policy(), |tx| {
        tx.execute("INSERT INTO t(v) VALUES('kept')", [])?;
        Ok(11)
    });
    assert_eq!(out.unwrap(), 11);

    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
        .expect("count");
    assert_eq!(n, 1);
}

#[test]
fn transaction_rolls_back_on_business_error() {
    let conn = rusqlite::Connection::open_in_memory().expect("open in-memory db");
    conn.execute("CREATE TABLE t(id INTEGER PRIMARY KEY, v TEXT)", [])
        .expect("create table");

    let mut calls = 0;
    let out: Result<(), CoreError> = run_in_transaction(&conn, &fast_policy(), |tx| {
        calls += 1;
        tx.execute("INSERT INTO t(v) VALUES('doomed')", [])?;
        Err(CoreError::validation("abort the unit"))
    });
    assert!(matches!(out.unwrap_err(), CoreError::Validation(_)));
    // Validation failures are not transient, so no retry happened.
    assert_eq!(calls, 1);

    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
        .expect("count");
    assert_eq!(n, 0);
}
