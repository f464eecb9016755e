use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serieswatch_core::SeriesCode;
use serieswatch_data::{SeriesSnapshot, SeriesSource, SourceError, SourceResult};

/// [`SeriesSource`] replaying queued responses per series code.
///
/// An exhausted queue answers with a transient error so unexpected fetches show up in outcomes.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<SeriesCode, VecDeque<SourceResult<SeriesSnapshot>>>>,
    calls: Mutex<HashMap<SeriesCode, usize>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, code: &SeriesCode, result: SourceResult<SeriesSnapshot>) {
        self.scripts
            .lock()
            .entry(code.clone())
            .or_default()
            .push_back(result);
    }

    pub fn calls(&self, code: &SeriesCode) -> usize {
        self.calls.lock().get(code).copied().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Highest number of fetches observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SeriesSource for ScriptedSource {
    async fn fetch_series(&self, code: &SeriesCode) -> SourceResult<SeriesSnapshot> {
        *self.calls.lock().entry(code.clone()).or_default() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.scripts
            .lock()
            .get_mut(code)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(SourceError::Transient(format!("no scripted response for {code}"))))
    }
}
