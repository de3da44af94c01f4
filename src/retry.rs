use std::time::Duration;

use rusqlite::{Connection, Transaction};

use crate::error::CoreError;

/// Retry policy for transient store conflicts: `max_attempts` total tries,
/// linear backoff (attempt n sleeps n * base_delay before the next try).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the
/// policy. The last transient error is re-raised to the caller; it is never
/// swallowed. `op` receives the 1-based attempt number.
pub fn run_retryable<T, E, F>(
    policy: &RetryPolicy,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Result<T, E>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if is_transient(&e) && attempt < policy.max_attempts => {
                std::thread::sleep(policy.delay_for(attempt));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run `op` inside a transaction, retrying the whole unit on transient
/// conflicts. Each attempt gets a fresh transaction; a transaction that is
/// not committed rolls back when dropped, so the scope is closed on every
/// exit path (success, abort, or exhausted retries).
pub fn run_in_transaction<T, F>(
    conn: &Connection,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, CoreError>
where
    F: FnMut(&Transaction) -> Result<T, CoreError>,
{
    run_retryable(policy, CoreError::is_transient, |attempt| {
        if attempt > 1 {
            tracing::debug!(attempt, "retrying transactional unit");
        }
        let tx = conn.unchecked_transaction()?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    })
}
