/*!
 * Bounded retries with exponential backoff.
 *
 * One policy is shared by every pipeline step. Only errors reporting
 * `is_retryable()` are retried; anything else is returned after the
 * first attempt.
 */

use log::warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::errors::PipelineError;

/// Result of running an operation under a [`RetryPolicy`]
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, PipelineError>,
    /// Attempts made, including the first
    pub attempts: u32,
}

/// Retry settings: attempt budget and backoff curve
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), Duration::from_secs(30))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first try and is at least 1
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: false,
        }
    }

    /// Retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self::immediate(1)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn sleep_duration(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        // Keep half of the delay, randomize the rest
        let half = delay / 2;
        let spread = rand::rng().random_range(0..=half.as_millis() as u64);
        half + Duration::from_millis(spread)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// runs out of attempts. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Retried<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return Retried {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.sleep_duration(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, self.max_attempts, delay, e
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Retried {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}
