use async_trait::async_trait;
use chrono::NaiveDate;
use serieswatch_core::{Observation, SeriesCode};

use crate::{SourceError, SourceResult};

/// Provider of statistical series observations.
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Fetch the observations of `code` together with the provider's latest update date.
    async fn fetch_series(&self, code: &SeriesCode) -> SourceResult<SeriesSnapshot>;
}

/// Observations of one series, most recent first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesSnapshot {
    code: SeriesCode,
    observations: Vec<Observation>,
    provider_update_date: NaiveDate,
}

impl SeriesSnapshot {
    /// Build a snapshot with an explicit provider update date. Observations may be in any order.
    pub fn new(
        code: SeriesCode,
        mut observations: Vec<Observation>,
        provider_update_date: NaiveDate,
    ) -> Self {
        observations.sort_by(|a, b| b.date.cmp(&a.date));
        Self {
            code,
            observations,
            provider_update_date,
        }
    }

    /// Build a snapshot whose update date is the date of the most recent observation.
    pub fn from_observations(code: SeriesCode, observations: Vec<Observation>) -> SourceResult<Self> {
        let latest = observations
            .iter()
            .map(|obs| obs.date)
            .max()
            .ok_or_else(|| SourceError::EmptyResult(code.to_string()))?;
        Ok(Self::new(code, observations, latest))
    }

    pub fn code(&self) -> &SeriesCode {
        &self.code
    }

    /// Observations ordered from most recent to oldest.
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn provider_update_date(&self) -> NaiveDate {
        self.provider_update_date
    }

    /// The two most recent observations as `(latest, previous)`.
    pub fn latest_pair(&self) -> Option<(&Observation, &Observation)> {
        match self.observations.as_slice() {
            [latest, previous, ..] => Some((latest, previous)),
            _ => None,
        }
    }
}
