//! Bounded retry for whole ledger operations.
//!
//! Transient storage conflicts (lock timeouts, uniqueness races, aborted
//! transactions) are retried by re-running the entire operation from the
//! top, never by resuming a half-finished one.

use std::future::Future;

use curator_types::{LedgerError, Result, RetryPolicy};

/// Run `op` up to `policy.max_attempts` times.
///
/// `op` receives the 1-based attempt number. Only errors for which
/// [`LedgerError::is_retryable`] holds are retried; anything else is
/// returned at once. When the last attempt still fails with a retryable
/// error, [`LedgerError::RetriesExhausted`] is returned.
pub async fn with_bounded_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                if attempt >= max_attempts {
                    tracing::error!(operation, attempts = attempt, error = %err, "retries exhausted");
                    return Err(LedgerError::RetriesExhausted {
                        operation,
                        attempts: attempt,
                        last: err.to_string(),
                    });
                }
                tracing::warn!(operation, attempt, error = %err, "transient failure, retrying");
                tokio::time::sleep(policy.backoff()).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
