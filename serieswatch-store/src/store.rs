use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serieswatch_core::{CheckpointField, SeriesCode, Subscription, SubscriptionId, DATE_FORMAT};
use tracing::{debug, info};

use crate::{
    InMemorySubscriptionBackend, NewSubscription, SqliteSubscriptionBackend, StoreError,
    StoreResult, SubscriptionBackend,
};

/// Validating facade over a [`SubscriptionBackend`].
///
/// Every argument is checked before the backend is touched, so a rejected call never
/// costs a round trip to storage.
#[derive(Clone)]
pub struct SubscriptionStore {
    backend: Arc<dyn SubscriptionBackend>,
}

impl SubscriptionStore {
    pub fn new(backend: Arc<dyn SubscriptionBackend>) -> Self {
        Self { backend }
    }

    /// Open (and migrate) the SQLite database at `path`.
    pub fn open_sqlite(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let backend = SqliteSubscriptionBackend::new(path)?;
        Ok(Self::new(Arc::new(backend)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySubscriptionBackend::new()))
    }

    /// Register a new subscription.
    ///
    /// `threshold_margin` must parse as a non-negative decimal and `known_update_date`,
    /// when present, as `YYYY-MM-DD`. The series code is normalized to uppercase.
    pub fn create(
        &self,
        series_code: &str,
        subscriber_address: &str,
        threshold_margin: &str,
        known_update_date: Option<&str>,
    ) -> StoreResult<Subscription> {
        let series_code = parse_series_code(series_code)?;
        let subscriber_address = require("subscriber address", subscriber_address)?;
        let threshold_margin = parse_threshold(threshold_margin)?;
        let last_known_update_date = known_update_date.map(parse_date).transpose()?;
        let record = NewSubscription {
            series_code,
            subscriber_address: subscriber_address.to_string(),
            threshold_margin,
            last_known_update_date,
        };
        let created = self.backend.insert(&record)?;
        info!(
            subscription_id = %created.id,
            series = %created.series_code,
            threshold = %created.threshold_margin,
            "subscription created"
        );
        Ok(created)
    }

    /// Remove the subscriptions of `subscriber_address` to `series_code`.
    pub fn delete(
        &self,
        series_code: &str,
        subscriber_address: &str,
    ) -> StoreResult<Vec<Subscription>> {
        let series_code = parse_series_code(series_code)?;
        let subscriber_address = require("subscriber address", subscriber_address)?;
        let removed = self.backend.remove(&series_code, subscriber_address)?;
        if removed.is_empty() {
            return Err(StoreError::NotFound(format!(
                "no subscription to {series_code} for {subscriber_address}"
            )));
        }
        info!(series = %series_code, removed = removed.len(), "subscription deleted");
        Ok(removed)
    }

    pub fn update_checked(&self, id: &SubscriptionId, date: NaiveDate) -> StoreResult<()> {
        self.write_checkpoint(id, CheckpointField::Checked, date)
    }

    pub fn update_known_update(&self, id: &SubscriptionId, date: NaiveDate) -> StoreResult<()> {
        self.write_checkpoint(id, CheckpointField::KnownUpdate, date)
    }

    pub fn update_alerted(&self, id: &SubscriptionId, date: NaiveDate) -> StoreResult<()> {
        self.write_checkpoint(id, CheckpointField::Alerted, date)
    }

    /// Subscriptions not yet evaluated on `reference`.
    pub fn list_eligible(&self, reference: NaiveDate) -> StoreResult<Vec<Subscription>> {
        self.backend.eligible(reference)
    }

    pub fn list(&self) -> StoreResult<Vec<Subscription>> {
        self.backend.all()
    }

    fn write_checkpoint(
        &self,
        id: &SubscriptionId,
        field: CheckpointField,
        date: NaiveDate,
    ) -> StoreResult<()> {
        if id.is_blank() {
            return Err(StoreError::Validation(
                "subscription id must not be empty".to_string(),
            ));
        }
        if !self.backend.write_checkpoint(id, field, date)? {
            return Err(StoreError::NotFound(format!("subscription {id}")));
        }
        debug!(subscription_id = %id, field = %field, %date, "checkpoint written");
        Ok(())
    }
}

fn require<'a>(label: &str, value: &'a str) -> StoreResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{label} must not be empty")));
    }
    Ok(trimmed)
}

fn parse_series_code(value: &str) -> StoreResult<SeriesCode> {
    SeriesCode::from_str(value).map_err(StoreError::Validation)
}

fn parse_threshold(value: &str) -> StoreResult<Decimal> {
    let raw = require("threshold margin", value)?;
    let threshold = Decimal::from_str(raw)
        .map_err(|err| StoreError::Validation(format!("invalid threshold margin {raw}: {err}")))?;
    if threshold.is_sign_negative() && !threshold.is_zero() {
        return Err(StoreError::Validation(format!(
            "threshold margin must not be negative, got {raw}"
        )));
    }
    Ok(threshold)
}

fn parse_date(value: &str) -> StoreResult<NaiveDate> {
    let raw = require("known update date", value)?;
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|err| StoreError::Validation(format!("invalid date {raw}: {err}")))
}
