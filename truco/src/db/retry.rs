//! Timeouts and bounded retries for calls that leave the process.
//!
//! Store queries and payment-provider calls go through [`with_timeout`] and
//! [`retry`], so a stuck dependency surfaces as a transient error instead of
//! a hang.

use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::timeout;

use super::errors::{StoreError, StoreResult};

/// Default timeout for database queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for ledger commits (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that know whether a retry might help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

/// Execute a query with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `StoreResult<T>` - Result or `StoreError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(StoreError::Database(e)),
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}

/// Execute a query with default timeout (5 seconds)
pub async fn with_default_timeout<F, T>(future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                log::warn!(
                    "{label} failed (attempt {attempt}/{}), retrying in {delay:?}: {e}",
                    policy.max_attempts
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
