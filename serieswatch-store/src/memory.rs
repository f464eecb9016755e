use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serieswatch_core::{CheckpointField, SeriesCode, Subscription, SubscriptionId};
use uuid::Uuid;

use crate::{NewSubscription, StoreResult, SubscriptionBackend};

/// Process-local backend used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionBackend {
    records: Mutex<Vec<Subscription>>,
}

impl InMemorySubscriptionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a single record.
    pub fn get(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.records.lock().iter().find(|sub| &sub.id == id).cloned()
    }
}

impl SubscriptionBackend for InMemorySubscriptionBackend {
    fn insert(&self, record: &NewSubscription) -> StoreResult<Subscription> {
        let subscription = Subscription {
            id: SubscriptionId::new(Uuid::new_v4().to_string()),
            series_code: record.series_code.clone(),
            subscriber_address: record.subscriber_address.clone(),
            threshold_margin: record.threshold_margin,
            last_known_update_date: record.last_known_update_date,
            last_checked_date: None,
            last_alert_date: None,
            created_at: Utc::now(),
        };
        self.records.lock().push(subscription.clone());
        Ok(subscription)
    }

    fn remove(
        &self,
        series_code: &SeriesCode,
        subscriber_address: &str,
    ) -> StoreResult<Vec<Subscription>> {
        let mut records = self.records.lock();
        let (removed, kept): (Vec<Subscription>, Vec<Subscription>) =
            records.drain(..).partition(|sub| {
                &sub.series_code == series_code && sub.subscriber_address == subscriber_address
            });
        *records = kept;
        Ok(removed)
    }

    fn write_checkpoint(
        &self,
        id: &SubscriptionId,
        field: CheckpointField,
        date: NaiveDate,
    ) -> StoreResult<bool> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|sub| &sub.id == id) {
            Some(record) => {
                record.set_checkpoint(field, date);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn eligible(&self, reference: NaiveDate) -> StoreResult<Vec<Subscription>> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|sub| sub.is_eligible(reference))
            .cloned()
            .collect())
    }

    fn all(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self.records.lock().clone())
    }
}
