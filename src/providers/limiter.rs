/*!
 * Shared pacing and deadlines for outbound completion calls.
 *
 * `RateLimiter` spaces requests evenly (one slot every `60s / rpm`), which is
 * the GCRA scheme with a burst of one. `LimitedProvider` routes every call of
 * a wrapped provider through a limiter and a timeout.
 */

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{Completion, CompletionProvider, CompletionRequest};
use crate::errors::ProviderError;

/// Requests-per-minute limiter shared by all callers holding the same `Arc`
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// `None` or `Some(0)` disables limiting
    pub fn per_minute(requests_per_minute: Option<u32>) -> Self {
        let interval = requests_per_minute
            .filter(|rpm| *rpm > 0)
            .map(|rpm| Duration::from_secs(60) / rpm);
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::per_minute(None)
    }

    /// Minimum spacing between two requests
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Wait until this caller's slot comes up.
    ///
    /// Slots are reserved under the lock, so concurrent callers queue up one
    /// interval apart instead of waking together.
    pub async fn acquire(&self) {
        let Some(interval) = self.interval else {
            return;
        };

        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = match *next {
                Some(reserved) if reserved > now => reserved,
                _ => now,
            };
            *next = Some(slot + interval);
            slot
        };

        let now = Instant::now();
        if slot > now {
            debug!("Rate limiter: waiting {:?} for next slot", slot - now);
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// Provider decorator adding rate limiting and a per-call deadline
#[derive(Debug)]
pub struct LimitedProvider {
    inner: Arc<dyn CompletionProvider>,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
}

impl LimitedProvider {
    pub fn new(inner: Arc<dyn CompletionProvider>, limiter: Arc<RateLimiter>, timeout: Duration) -> Self {
        Self {
            inner,
            limiter,
            timeout,
        }
    }
}

#[async_trait]
impl CompletionProvider for LimitedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.limiter.acquire().await;
        match tokio::time::timeout(self.timeout, self.inner.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
