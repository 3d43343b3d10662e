//! Bounded retry loop for ledger units of work.
//!
//! A unit that fails with a retryable store error (version conflict,
//! serialization failure, lock timeout) is restarted from `begin`. Once the
//! budget is spent the last error is handed back to the caller, whose
//! `kind()` reports it as transient.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use tracing::warn;

use crate::error::{CancelError, CompletionError, CreateError, JoinError, LeaveError, ReviewError};
use crate::store::StoreError;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Errors that can tell whether restarting the unit of work may help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        StoreError::is_retryable(self)
    }
}

macro_rules! retryable_via_store {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Retryable for $ty {
                fn is_retryable(&self) -> bool {
                    matches!(self, Self::Store(e) if e.is_retryable())
                }
            }
        )*
    };
}

retryable_via_store!(CreateError, JoinError, LeaveError, CompletionError, CancelError, ReviewError);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff_ms,
        }
    }

    /// Exponential delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let millis = self.base_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(millis).min(MAX_BACKOFF)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        if self.base_backoff_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.base_backoff_ms);
        (base + Duration::from_millis(jitter)).min(MAX_BACKOFF)
    }

    /// Run `unit` until it succeeds, fails with a non-retryable error, or the budget runs out.
    pub async fn run<F, Fut, T, E>(&self, operation: &'static str, mut unit: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match unit().await {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.jittered(attempt);
                    counter!("ledger_retries_total", "operation" => operation).increment(1);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying unit of work"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(5, 10);
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.backoff_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(40));
        assert_eq!(policy.backoff_for_attempt(30), MAX_BACKOFF);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::new(0, 10).max_attempts, 1);
    }

    #[test]
    fn test_operation_errors_retry_only_on_store_conflicts() {
        assert!(JoinError::Store(StoreError::Conflict("gb".into())).is_retryable());
        assert!(!JoinError::CapacityFull.is_retryable());
        assert!(!ReviewError::Store(StoreError::Duplicate("review".into())).is_retryable());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::new(5, 0);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<u32, StoreError> = policy
            .run("test", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(StoreError::Conflict("row".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let policy = RetryPolicy::new(3, 0);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), StoreError> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Transient("timeout".into()))
            })
            .await;

        assert!(matches!(result, Err(StoreError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::new(5, 0);
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), JoinError> = policy
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JoinError::AlreadyJoined)
            })
            .await;

        assert!(matches!(result, Err(JoinError::AlreadyJoined)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
