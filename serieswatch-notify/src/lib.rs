//! Alert delivery channels.
//!
//! A [`Notifier`] reports delivery as a plain `bool`: expected failures (provider rejects the
//! message, network errors) are logged and surface as `false`, never as an error value.

mod email;
mod logger;
mod message;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serieswatch_core::SeriesCode;

pub use email::{EmailApiConfig, EmailApiNotifier};
pub use logger::LogNotifier;
pub use message::AlertMessage;

/// Alert raised for one subscriber when a series moved past their threshold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeriesAlert {
    pub series_code: SeriesCode,
    pub subscriber_address: String,
    /// Relative change between the two most recent observations, in percent.
    pub margin: Decimal,
    pub provider_update_date: NaiveDate,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt delivery once; `true` only when the channel confirmed acceptance.
    async fn send(&self, alert: &SeriesAlert) -> bool;
}
