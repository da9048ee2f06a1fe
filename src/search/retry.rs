use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{FetchError, SearchError};

/// How the wait grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`
    Exponential,
}

/// Retry policy for provider calls, kept apart from the call itself so the same policy
/// can wrap any search provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), Backoff::Linear)
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff,
        }
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self
                .base_delay
                .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX)),
            Backoff::Exponential => {
                let shift = u32::try_from(attempt - 1).unwrap_or(u32::MAX).min(20);
                self.base_delay.saturating_mul(1u32 << shift)
            }
        }
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number. Only `SearchError::Transient` is retried,
    /// and there is no sleep after the final attempt.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, SearchError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("Succeeded on attempt {} of {}", attempt, attempts);
                    }
                    return Ok(value);
                }
                Err(SearchError::Transient(msg)) => {
                    warn!("Attempt {} failed with error: {}", attempt, msg);
                    last_error = msg;
                    if attempt < attempts {
                        let delay = self.delay_for(attempt);
                        debug!("Backing off for {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(fatal) => return Err(FetchError::Provider(fatal)),
            }
        }

        Err(FetchError::ExhaustedRetries {
            attempts,
            last_error,
        })
    }
}
