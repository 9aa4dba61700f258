//! Bounded retry with exponential backoff. The caller supplies a classifier
//! that decides per error whether another attempt can help; terminal errors
//! short-circuit without burning the remaining attempts.

use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

/// Classifier verdict for one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Backoff schedule: delays double from `base_delay_secs` up to
/// `max_delay_secs`, each widened by a random jitter below the base so
/// parallel fetches against one flaky host spread out.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts = max_retries + 1.
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // 3 attempts total, 2s/4s between them.
        Self {
            max_retries: 2,
            base_delay_secs: 2,
            max_delay_secs: 30,
        }
    }
}

impl RetryConfig {
    /// Total number of attempts the retry loop will make.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (0-indexed):
    /// `min(base << retry, max)` plus jitter in `0..base`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let doubled = self
            .base_delay_secs
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let mut secs = doubled.min(self.max_delay_secs);
        if self.base_delay_secs > 0 {
            secs += rand::thread_rng().gen_range(0..self.base_delay_secs);
        }
        Duration::from_secs(secs)
    }
}

/// Drive `operation` until it succeeds, the classifier rules an error
/// terminal, or the configured attempts run out. The error handed back is
/// always the one from the last attempt made.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    classifier: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        attempt += 1;

        if classifier(&err) == RetryAction::Abort || attempt >= config.total_attempts() {
            return Err(err);
        }

        let delay = config.delay_for_retry(attempt - 1);
        tracing::warn!(
            "Attempt {attempt}/{total} failed, next try in {wait}s: {err}",
            total = config.total_attempts(),
            wait = delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }
}
