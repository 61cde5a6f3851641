use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use harvest_common::FetchSettings;

use crate::page::{FetchMode, FetchResult};
use crate::PageFetcher;

/// Bounded exponential backoff: `base * 2^(attempt-1)`, capped at `max`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base: settings.backoff_base,
            max: settings.backoff_max,
        }
    }

    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&FetchSettings::default())
    }
}

/// Fetch `url`, retrying retriable failures until the attempt cap. Returns the
/// last result and the number of attempts made. No retry is started once
/// `cancel` is set.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    mode: FetchMode,
    policy: &RetryPolicy,
    cancel: &AtomicBool,
) -> (FetchResult, u32) {
    let mut attempt = 1;
    loop {
        let result = fetcher.fetch(url, mode).await;
        let failure = match &result {
            Ok(_) => return (result, attempt),
            Err(f) => f,
        };

        if !failure.is_retriable() || attempt >= policy.max_attempts {
            return (result, attempt);
        }
        if cancel.load(Ordering::Relaxed) {
            info!(url, attempt, "Cancelled, not retrying");
            return (result, attempt);
        }

        let backoff = policy.delay_for(attempt);
        let jitter_cap = (backoff.as_millis() as u64) / 4;
        let jitter = Duration::from_millis(rand::rng().random_range(0..=jitter_cap));
        warn!(
            url,
            attempt,
            kind = %failure.kind,
            backoff_ms = (backoff + jitter).as_millis() as u64,
            "Fetch failed, retrying"
        );
        tokio::time::sleep(backoff + jitter).await;
        attempt += 1;
    }
}
