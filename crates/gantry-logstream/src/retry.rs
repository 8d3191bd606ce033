//! Exponential backoff with an optional elapsed-time budget
//!
//! Open calls run under a 10 second budget; write/upload calls run
//! unbounded so a transient log-service outage does not drop logs. Dropping
//! the returned future cancels the loop, which is how callers bound an
//! unbounded budget.

use crate::error::{LogStreamError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default first wait between attempts.
const INITIAL_INTERVAL: Duration = Duration::from_millis(250);

/// Ceiling for the doubling interval.
const MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Budget applied to stream-open calls.
pub const OPEN_BUDGET: Duration = Duration::from_secs(10);

/// Retry policy: doubling waits from 250 ms capped at 10 s, optionally
/// bounded by a total elapsed budget.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    budget: Option<Duration>,
}

impl Backoff {
    /// Retry until the budget elapses.
    pub fn with_budget(budget: Duration) -> Self {
        Backoff {
            budget: Some(budget),
        }
    }

    /// Retry forever (until canceled by dropping the future).
    pub fn unbounded() -> Self {
        Backoff { budget: None }
    }

    /// Run `op` until it succeeds, fails terminally, or the budget elapses.
    ///
    /// Only errors flagged retriable (transport failures, 5xx) are retried.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut interval = INITIAL_INTERVAL;
        let mut attempt = 1u32;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(what, attempt, "retried operation succeeded");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retriable() => return Err(err),
                Err(err) => {
                    if let Some(budget) = self.budget {
                        if started.elapsed() + interval > budget {
                            return Err(LogStreamError::BudgetExhausted(budget, err.to_string()));
                        }
                    }
                    warn!(what, attempt, error = %err, wait_ms = interval.as_millis() as u64,
                          "transient failure, backing off");
                    tokio::time::sleep(interval).await;
                    interval = (interval * 2).min(MAX_INTERVAL);
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> LogStreamError {
        LogStreamError::Service {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = Backoff::unbounded()
            .retry("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_terminal_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = Backoff::unbounded()
            .retry("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(LogStreamError::Service {
                        status: 400,
                        message: "bad request".to_string(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_surfaces_last_error() {
        let result: Result<()> = Backoff::with_budget(Duration::from_secs(2))
            .retry("op", || async { Err(transient()) })
            .await;
        match result {
            Err(LogStreamError::BudgetExhausted(budget, _)) => {
                assert_eq!(budget, Duration::from_secs(2));
            }
            other => panic!("expected budget exhaustion, got {other:?}"),
        }
    }
}
