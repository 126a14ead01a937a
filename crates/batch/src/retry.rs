//! Bounded retry with exponential backoff.
//!
//! The policy only decides *whether* and *when* to run an operation again;
//! it carries no state between calls and has no side effects of its own.
//! Whether a failure is worth retrying is the error's call, not the
//! policy's, via [`Retryable`].

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Errors that can report whether a retry might succeed.
///
/// Implemented on the `Exn` error types of the workspace crates by
/// delegating to their kind's `is_retryable`.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for tome_catalog::error::Error {
    fn is_retryable(&self) -> bool {
        (**self).is_retryable()
    }
}

impl Retryable for tome_ledger::error::Error {
    fn is_retryable(&self) -> bool {
        (**self).is_retryable()
    }
}

impl Retryable for crate::error::Error {
    fn is_retryable(&self) -> bool {
        (**self).is_retryable()
    }
}

/// Retry budget for transient failures.
///
/// Delays double on every failed attempt: `base_delay * 2^(attempt - 1)`.
/// The defaults (three attempts starting at one second) are tuned for a
/// rate-limit-happy remote catalog, not for local I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// The delay to sleep after a failed `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget runs out. Returns the final result together with the
    /// number of attempts actually made.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> (Result<T, E>, u32)
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if attempt < self.max_attempts && err.is_retryable() => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                    tokio::time::sleep(delay).await;
                },
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}
