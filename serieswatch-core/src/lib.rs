//! Core domain types shared by every serieswatch crate.

pub mod margin;
pub mod outcome;
pub mod series;
pub mod subscription;

pub use margin::{margin, MarginError};
pub use outcome::ReconciliationOutcome;
pub use series::{Observation, SeriesCode};
pub use subscription::{CheckpointField, Subscription, SubscriptionId};

/// Date format used for every persisted or user supplied calendar date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
