use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serieswatch_core::{ReconciliationOutcome, SeriesCode, SubscriptionId};

/// Step of the per-subscription routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStage {
    Fetching,
    Evaluating,
    Notifying,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fetching => "fetching",
            Self::Evaluating => "evaluating",
            Self::Notifying => "notifying",
        };
        f.write_str(label)
    }
}

/// What happened to one subscription during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionReport {
    pub subscription_id: SubscriptionId,
    pub series_code: SeriesCode,
    pub outcome: ReconciliationOutcome,
    pub margin: Option<Decimal>,
    pub provider_update_date: Option<NaiveDate>,
    pub failed_stage: Option<ReconcileStage>,
    pub diagnostic: Option<String>,
    /// Checkpoint writes that failed; they do not change the outcome.
    pub checkpoint_errors: Vec<String>,
}

impl SubscriptionReport {
    pub(crate) fn new(subscription_id: SubscriptionId, series_code: SeriesCode) -> Self {
        Self {
            subscription_id,
            series_code,
            outcome: ReconciliationOutcome::Unchanged,
            margin: None,
            provider_update_date: None,
            failed_stage: None,
            diagnostic: None,
            checkpoint_errors: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, stage: ReconcileStage, diagnostic: impl Into<String>) {
        self.outcome = ReconciliationOutcome::Failed;
        self.failed_stage = Some(stage);
        self.diagnostic = Some(diagnostic.into());
    }

    /// Report for a worker that died before producing its own report.
    pub(crate) fn aborted(
        subscription_id: SubscriptionId,
        series_code: SeriesCode,
        diagnostic: impl Into<String>,
    ) -> Self {
        let mut report = Self::new(subscription_id, series_code);
        report.outcome = ReconciliationOutcome::Failed;
        report.diagnostic = Some(diagnostic.into());
        report
    }
}

/// Aggregate result of one run of the driver.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub reference_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub eligible: usize,
    pub dispatched: usize,
    /// Eligible subscriptions left untouched because shutdown was requested.
    pub skipped: usize,
    pub outcomes: BTreeMap<ReconciliationOutcome, usize>,
    pub reports: Vec<SubscriptionReport>,
}

impl RunSummary {
    pub(crate) fn new(reference_date: NaiveDate, started_at: DateTime<Utc>) -> Self {
        Self {
            reference_date,
            started_at,
            finished_at: started_at,
            eligible: 0,
            dispatched: 0,
            skipped: 0,
            outcomes: ReconciliationOutcome::ALL
                .iter()
                .map(|outcome| (*outcome, 0))
                .collect(),
            reports: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, report: SubscriptionReport) {
        *self.outcomes.entry(report.outcome).or_default() += 1;
        self.reports.push(report);
    }

    pub fn count(&self, outcome: ReconciliationOutcome) -> usize {
        self.outcomes.get(&outcome).copied().unwrap_or_default()
    }

    pub fn failed(&self) -> usize {
        self.count(ReconciliationOutcome::Failed)
    }

    pub fn report(&self, id: &SubscriptionId) -> Option<&SubscriptionReport> {
        self.reports
            .iter()
            .find(|report| &report.subscription_id == id)
    }
}
