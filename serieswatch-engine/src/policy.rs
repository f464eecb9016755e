use std::time::Duration;

use serieswatch_core::SeriesCode;
use serieswatch_data::{SeriesSnapshot, SeriesSource, SourceError, SourceResult};
use serieswatch_notify::{Notifier, SeriesAlert};
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Timeout and bounded retry applied to one kind of external call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first one.
    pub retries: u32,
    pub backoff: Duration,
}

/// Result of a guarded notifier call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The channel answered and reported failure.
    Rejected,
    TimedOut(Duration),
}

impl CallPolicy {
    pub fn new(timeout: Duration, retries: u32, backoff: Duration) -> Self {
        Self {
            timeout,
            retries,
            backoff,
        }
    }

    pub fn fetch_default() -> Self {
        Self::new(Duration::from_secs(30), 1, Duration::from_millis(500))
    }

    pub fn notify_default() -> Self {
        Self::new(Duration::from_secs(20), 0, Duration::ZERO)
    }

    /// Fetch a series, retrying transient failures and timeouts within the budget.
    pub async fn fetch(
        &self,
        source: &dyn SeriesSource,
        code: &SeriesCode,
    ) -> SourceResult<SeriesSnapshot> {
        let mut attempt = 0u32;
        loop {
            let result = match timeout(self.timeout, source.fetch_series(code)).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(self.timeout)),
            };
            match result {
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(series = %code, attempt, error = %err, "retrying series fetch");
                    self.pause().await;
                }
                other => return other,
            }
        }
    }

    /// Send an alert. Only timeouts are retried; an explicit `false` ends the attempt.
    pub async fn notify(&self, notifier: &dyn Notifier, alert: &SeriesAlert) -> Delivery {
        let mut attempt = 0u32;
        loop {
            match timeout(self.timeout, notifier.send(alert)).await {
                Ok(true) => return Delivery::Delivered,
                Ok(false) => return Delivery::Rejected,
                Err(_) if attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        series = %alert.series_code,
                        attempt,
                        timeout = ?self.timeout,
                        "notifier timed out, retrying"
                    );
                    self.pause().await;
                }
                Err(_) => return Delivery::TimedOut(self.timeout),
            }
        }
    }

    async fn pause(&self) {
        if !self.backoff.is_zero() {
            sleep(self.backoff).await;
        }
    }
}
