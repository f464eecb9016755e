use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::SeriesCode;

/// Opaque identifier assigned to a subscription by the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Durable monitoring request plus the checkpoint dates maintained by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub series_code: SeriesCode,
    pub subscriber_address: String,
    /// Minimum absolute margin, in percent, that triggers an alert.
    pub threshold_margin: Decimal,
    pub last_known_update_date: Option<NaiveDate>,
    pub last_checked_date: Option<NaiveDate>,
    pub last_alert_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Whether the subscription still has to be evaluated on `reference`.
    pub fn is_eligible(&self, reference: NaiveDate) -> bool {
        self.last_checked_date != Some(reference)
    }

    /// Whether `margin` reaches the subscriber's threshold. The comparison is inclusive.
    pub fn should_alert(&self, margin: Decimal) -> bool {
        margin.abs() >= self.threshold_margin
    }

    pub fn set_checkpoint(&mut self, field: CheckpointField, date: NaiveDate) {
        match field {
            CheckpointField::Checked => self.last_checked_date = Some(date),
            CheckpointField::KnownUpdate => self.last_known_update_date = Some(date),
            CheckpointField::Alerted => self.last_alert_date = Some(date),
        }
    }
}

/// The three independently written checkpoint dates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointField {
    Checked,
    KnownUpdate,
    Alerted,
}

impl CheckpointField {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointField::Checked => "checked",
            CheckpointField::KnownUpdate => "known_update",
            CheckpointField::Alerted => "alerted",
        }
    }
}

impl fmt::Display for CheckpointField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
