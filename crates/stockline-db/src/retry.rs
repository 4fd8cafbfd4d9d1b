//! # Conflict Retry
//!
//! Bounded retry of whole units of work that lost SQLite's write lock.
//!
//! ```text
//! attempt ──► Ok / other error ──────────────────────────► return
//!    │
//!    └──► ConcurrencyConflict ──► retries left? ──yes──► sleep(backoff) ──► attempt
//!                                      │
//!                                      no
//!                                      ▼
//!                              return ConcurrencyConflict
//! ```
//!
//! Each attempt opens its own transaction, so a failed attempt has already
//! rolled back when the next one starts.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::warn;

use crate::error::DbResult;

/// How often and how patiently to retry a conflicted write.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `attempt` until it succeeds, fails with a non-conflict error,
    /// or the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let mut backoff = self.backoff();
        let mut retries: u32 = 0;

        loop {
            match attempt().await {
                Err(err) if err.is_conflict() && retries < self.max_retries => {
                    retries += 1;
                    let wait = backoff.next_backoff().unwrap_or(self.max_backoff);
                    warn!(
                        operation,
                        retries,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Write conflict, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(err) if err.is_conflict() => {
                    warn!(operation, retries, error = %err, "Write conflict, giving up");
                    return Err(err);
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_retries_conflicts_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(3)
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DbError::ConcurrencyConflict("busy".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: DbResult<()> = fast(2)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::ConcurrencyConflict("busy".to_string()))
            })
            .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: DbResult<()> = fast(5)
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DbError::not_found("Variant", "x"))
            })
            .await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
