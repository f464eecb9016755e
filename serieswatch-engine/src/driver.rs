use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::{
    ReconciliationEngine, RunError, RunResult, RunSummary, ShutdownSignal, SubscriptionReport,
};

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Lists eligible subscriptions and reconciles them with bounded parallelism.
pub struct RunDriver {
    engine: Arc<ReconciliationEngine>,
    concurrency: usize,
    shutdown: ShutdownSignal,
}

impl RunDriver {
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self {
            engine,
            concurrency: DEFAULT_CONCURRENCY,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Maximum number of subscriptions reconciled at once. Clamped to at least one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Reconcile every subscription not yet checked on `reference_date` (local today if absent).
    ///
    /// Only a failure to list subscriptions is returned as an error; per-subscription
    /// failures are part of the summary.
    pub async fn run_reconciliation(
        &self,
        reference_date: Option<NaiveDate>,
    ) -> RunResult<RunSummary> {
        let started_at = Utc::now();
        let reference = reference_date.unwrap_or_else(|| Local::now().date_naive());
        let eligible = self
            .engine
            .store()
            .list_eligible(reference)
            .map_err(|err| {
                error!(error = %err, "unable to list eligible subscriptions");
                RunError::Systemic(err.to_string())
            })?;

        let mut summary = RunSummary::new(reference, started_at);
        summary.eligible = eligible.len();
        info!(
            %reference,
            eligible = summary.eligible,
            concurrency = self.concurrency,
            "reconciliation run started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = Vec::with_capacity(eligible.len());
        let mut queue = eligible.into_iter();
        while let Some(subscription) = queue.next() {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.wait() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                summary.skipped = 1 + queue.len();
                warn!(
                    skipped = summary.skipped,
                    "shutdown requested; remaining subscriptions left for the next run"
                );
                break;
            };
            let engine = self.engine.clone();
            let id = subscription.id.clone();
            let code = subscription.series_code.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                engine.reconcile(&subscription, reference).await
            });
            workers.push((id, code, handle));
        }
        summary.dispatched = workers.len();

        for (id, code, handle) in workers {
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => {
                    error!(subscription_id = %id, series = %code, error = %err, "reconciliation worker aborted");
                    SubscriptionReport::aborted(id, code, format!("worker aborted: {err}"))
                }
            };
            summary.record(report);
        }
        summary.finished_at = Utc::now();

        info!(
            %reference,
            dispatched = summary.dispatched,
            skipped = summary.skipped,
            outcomes = ?summary.outcomes,
            "reconciliation run finished"
        );
        Ok(summary)
    }
}
