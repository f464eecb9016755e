use chrono::NaiveDate;
use rust_decimal::Decimal;
use serieswatch_core::{CheckpointField, SeriesCode, Subscription, SubscriptionId};

use crate::StoreResult;

/// Already validated payload for a new subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSubscription {
    pub series_code: SeriesCode,
    pub subscriber_address: String,
    pub threshold_margin: Decimal,
    pub last_known_update_date: Option<NaiveDate>,
}

/// Abstraction over durable subscription storage engines.
///
/// Backends trust their inputs; validation lives in [`crate::SubscriptionStore`].
pub trait SubscriptionBackend: Send + Sync {
    /// Persist a new record and return it with its assigned identifier.
    fn insert(&self, record: &NewSubscription) -> StoreResult<Subscription>;

    /// Remove every record matching the series/subscriber pair, returning what was removed.
    fn remove(&self, series_code: &SeriesCode, subscriber_address: &str)
        -> StoreResult<Vec<Subscription>>;

    /// Overwrite a single checkpoint column. Returns `false` when no record has `id`.
    fn write_checkpoint(
        &self,
        id: &SubscriptionId,
        field: CheckpointField,
        date: NaiveDate,
    ) -> StoreResult<bool>;

    /// Records whose last check is missing or differs from `reference`.
    fn eligible(&self, reference: NaiveDate) -> StoreResult<Vec<Subscription>>;

    /// Every stored record, oldest first.
    fn all(&self) -> StoreResult<Vec<Subscription>>;
}
