//! # Conflict Retry
//!
//! Re-runs a whole transaction body when it loses a write race.
//!
//! ```text
//!  attempt 1 ──► BEGIN … read … plan … apply … COMMIT ──► Ok
//!      │
//!      └── Conflict (busy / locked / stale compare-and-set), rolled back
//!            │   sleep next_backoff()   (exponential, jittered)
//!            ▼
//!  attempt 2 ──► BEGIN … read (fresh snapshot) … ──► Ok | Conflict
//!      ⋮
//!  attempt N ──► Conflict ──► ConflictRetryExhausted
//! ```
//!
//! Any other error (including a ledger rule violation such as insufficient
//! stock) returns immediately. The body must be safe to run more than once:
//! every attempt starts its own transaction and derives all writes from what
//! it reads.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};

/// How often and how patiently to retry a conflicting transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// First wait; later waits double, jittered, capped at 32×.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// Runs `body` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut body: F) -> DbResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.create_backoff();
        let mut attempt = 1;

        loop {
            match body().await {
                Err(err) if err.is_retryable() => {
                    if attempt >= max_attempts {
                        warn!(operation, attempts = attempt, error = %err, "Giving up on conflicting transaction");
                        return Err(DbError::ConflictRetryExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                        });
                    }
                    let wait = backoff.next_backoff().unwrap_or(self.backoff);
                    warn!(operation, attempt, ?wait, error = %err, "Transaction conflict, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                result => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Transaction settled after retry");
                    }
                    return result;
                }
            }
        }
    }

    /// Jittered exponential schedule starting at `backoff`.
    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.backoff,
            max_interval: self.backoff * 32,
            multiplier: 2.0,
            max_elapsed_time: None, // attempts bound the loop
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use kardex_core::CoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = &AtomicU32::new(0);
        let result = policy(5)
            .run("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(DbError::conflict("busy"))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let calls = &AtomicU32::new(0);
        let result: DbResult<()> = policy(3)
            .run("always busy", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DbError::conflict("busy"))
            })
            .await;

        assert!(matches!(
            result,
            Err(DbError::ConflictRetryExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rule_violations_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: DbResult<()> = policy(5)
            .run("oversell", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::not_found("Lot", "L1").into())
            })
            .await;

        assert!(matches!(result, Err(DbError::Core(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
