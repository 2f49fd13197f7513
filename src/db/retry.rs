//! Bounded retry for read operations.

use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Total attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// How often a failing read is repeated, and for how long at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; `0` is treated as `1`
    pub max_attempts: u32,
    /// Upper bound for the whole loop, repairs included
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up.
    ///
    /// `repair` runs between attempts (typically a reconnect). A failing
    /// repair ends the loop with the repair's error.
    pub async fn run<T, Op, OpFut, Repair, RepairFut>(
        &self,
        operation: &str,
        op: Op,
        repair: Repair,
    ) -> DbResult<T>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = DbResult<T>>,
        Repair: FnMut() -> RepairFut,
        RepairFut: Future<Output = DbResult<()>>,
    {
        match self.deadline {
            Some(deadline) => timeout(deadline, self.attempts(operation, op, repair))
                .await
                .map_err(|_| DbError::timeout(operation, deadline))?,
            None => self.attempts(operation, op, repair).await,
        }
    }

    async fn attempts<T, Op, OpFut, Repair, RepairFut>(
        &self,
        operation: &str,
        mut op: Op,
        mut repair: Repair,
    ) -> DbResult<T>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = DbResult<T>>,
        Repair: FnMut() -> RepairFut,
        RepairFut: Future<Output = DbResult<()>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(DbError::retry_exhausted(operation, attempt, err));
            }

            warn!(
                operation = %operation,
                attempt = attempt,
                max_attempts = max_attempts,
                error = %err,
                "Attempt failed; repairing before retry"
            );
            repair().await?;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> DbError {
        DbError::connection("connection reset", "retry")
    }

    #[tokio::test]
    async fn test_succeeds_first_time_without_repair() {
        let repairs = AtomicU32::new(0);
        let repairs = &repairs;
        let value = RetryPolicy::default()
            .run(
                "read",
                || async { Ok::<_, DbError>(5) },
                || async move {
                    repairs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert_eq!(repairs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_returns_immediately() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: DbResult<()> = RetryPolicy::default()
            .run(
                "read",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(DbError::row_not_found("t"))
                },
                || async { Ok(()) },
            )
            .await;
        assert!(matches!(result, Err(DbError::RowNotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repair_failure_aborts() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: DbResult<()> = RetryPolicy::default()
            .run(
                "read",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                },
                || async { Err(DbError::not_configured("db")) },
            )
            .await;
        assert!(matches!(result, Err(DbError::NotConfigured { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_runs_once() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: DbResult<()> = RetryPolicy::new(0)
            .run(
                "read",
                || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                },
                || async { Ok(()) },
            )
            .await;
        assert!(matches!(
            result,
            Err(DbError::RetryExhausted { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_the_loop() {
        let result: DbResult<()> = RetryPolicy::new(100)
            .with_deadline(Duration::from_secs(3))
            .run(
                "read",
                || async { Err(transient()) },
                || async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(())
                },
            )
            .await;
        assert!(matches!(result, Err(DbError::Timeout { .. })));
    }
}
