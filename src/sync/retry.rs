//! Retry policy for tracker calls.
//!
//! Transient failures (network errors, 5xx, timeouts) are retried with
//! exponential backoff and jitter. Rate-limit responses are different: the
//! worker sleeps until the tracker's reset instant and tries again without
//! spending a retry, up to a bounded number of waits.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;

use super::types::FetchError;

/// Default first backoff delay.
pub const DEFAULT_FIRST_BACKOFF_MS: u64 = 1_000;
/// Default backoff ceiling.
pub const DEFAULT_BACKOFF_CEILING_MS: u64 = 60_000;
/// Default number of retries for transient errors.
pub const DEFAULT_RETRIES: usize = 5;
/// Default number of rate-limit waits per call.
pub const DEFAULT_RATE_LIMIT_WAITS: u32 = 3;
/// Longest single rate-limit wait.
pub const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);

/// Exponential backoff bounds for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub first: Duration,
    pub ceiling: Duration,
    /// Retries after the initial attempt.
    pub retries: usize,
}

impl Backoff {
    fn strategy(self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.first)
            .with_max_delay(self.ceiling)
            .with_max_times(self.retries)
            .with_jitter()
    }
}

/// How one tracker call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub transient: Backoff,
    /// Rate-limit waits allowed per call. They do not spend `transient.retries`.
    pub rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient: Backoff {
                first: Duration::from_millis(DEFAULT_FIRST_BACKOFF_MS),
                ceiling: Duration::from_millis(DEFAULT_BACKOFF_CEILING_MS),
                retries: DEFAULT_RETRIES,
            },
            rate_limit_waits: DEFAULT_RATE_LIMIT_WAITS,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first transient error; rate limits are still waited out.
    #[must_use]
    pub fn without_retries(mut self) -> Self {
        self.transient.retries = 0;
        self
    }
}

/// Run `operation`, retrying transient failures and waiting out rate limits.
///
/// # Errors
///
/// Returns the last error once retries or rate-limit waits are exhausted,
/// or immediately for errors that are neither transient nor rate limits.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut waits = 0;
    loop {
        let attempt = AtomicU32::new(0);
        let result = (|| {
            attempt.fetch_add(1, Ordering::SeqCst);
            operation()
        })
        .retry(policy.transient.strategy())
        .notify(|err, dur| {
            tracing::warn!(
                "{what} failed, retrying in {:?} (attempt {}): {err}",
                dur,
                attempt.load(Ordering::SeqCst)
            );
        })
        .when(FetchError::is_retryable)
        .await;

        match result {
            Err(FetchError::RateLimited { reset_at }) if waits < policy.rate_limit_waits => {
                waits += 1;
                let wait = (reset_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_RATE_LIMIT_WAIT)
                    .max(policy.transient.first);
                tracing::warn!(
                    "{what} rate limited until {reset_at}, waiting {:?} ({waits}/{})",
                    wait,
                    policy.rate_limit_waits
                );
                tokio::time::sleep(wait).await;
            }
            other => return other,
        }
    }
}
