use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serieswatch_notify::{Notifier, SeriesAlert};

/// [`Notifier`] that records alerts and answers with a fixed result.
pub struct RecordingNotifier {
    succeed: bool,
    delay: Duration,
    attempts: AtomicUsize,
    alerts: Mutex<Vec<SeriesAlert>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            succeed: true,
            delay: Duration::ZERO,
            attempts: AtomicUsize::new(0),
            alerts: Mutex::new(Vec::new()),
        }
    }

    /// Every delivery reports failure.
    pub fn failing() -> Self {
        Self {
            succeed: false,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Alerts whose send call completed, whatever the reported result.
    pub fn alerts(&self) -> Vec<SeriesAlert> {
        self.alerts.lock().clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, alert: &SeriesAlert) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.alerts.lock().push(alert.clone());
        self.succeed
    }
}
