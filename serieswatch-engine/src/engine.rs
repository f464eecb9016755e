use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serieswatch_core::{
    margin, CheckpointField, MarginError, ReconciliationOutcome, Subscription, SubscriptionId,
};
use serieswatch_data::{SeriesSnapshot, SeriesSource};
use serieswatch_notify::{Notifier, SeriesAlert};
use serieswatch_store::{StoreError, StoreResult, SubscriptionStore};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::policy::{CallPolicy, Delivery};
use crate::report::{ReconcileStage, SubscriptionReport};

/// Decision reached for a subscription once its series has been fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Assessment {
    /// The provider has not published anything new since the last check.
    Unchanged,
    /// The series advanced but there are not two observations to compare.
    InsufficientHistory,
    BelowThreshold(Decimal),
    Alert(Decimal),
    MarginFailed(MarginError),
}

/// Compare a fetched snapshot against what the subscription has already seen.
pub fn assess(subscription: &Subscription, snapshot: &SeriesSnapshot) -> Assessment {
    if subscription.last_known_update_date == Some(snapshot.provider_update_date()) {
        return Assessment::Unchanged;
    }
    let Some((latest, previous)) = snapshot.latest_pair() else {
        return Assessment::InsufficientHistory;
    };
    match margin(latest.value, previous.value) {
        Ok(change) if subscription.should_alert(change) => Assessment::Alert(change),
        Ok(change) => Assessment::BelowThreshold(change),
        Err(err) => Assessment::MarginFailed(err),
    }
}

/// Runs the fetch, evaluate, notify and checkpoint sequence for single subscriptions.
///
/// Every failure is contained in the returned [`SubscriptionReport`]; nothing here aborts a run.
pub struct ReconciliationEngine {
    source: Arc<dyn SeriesSource>,
    notifier: Arc<dyn Notifier>,
    store: SubscriptionStore,
    fetch_policy: CallPolicy,
    notify_policy: CallPolicy,
}

impl ReconciliationEngine {
    pub fn new(
        source: Arc<dyn SeriesSource>,
        notifier: Arc<dyn Notifier>,
        store: SubscriptionStore,
    ) -> Self {
        Self {
            source,
            notifier,
            store,
            fetch_policy: CallPolicy::fetch_default(),
            notify_policy: CallPolicy::notify_default(),
        }
    }

    pub fn with_fetch_policy(mut self, policy: CallPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn with_notify_policy(mut self, policy: CallPolicy) -> Self {
        self.notify_policy = policy;
        self
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Reconcile one subscription against the reference date `today`.
    pub async fn reconcile(&self, subscription: &Subscription, today: NaiveDate) -> SubscriptionReport {
        let span = info_span!(
            "reconcile",
            subscription_id = %subscription.id,
            series = %subscription.series_code
        );
        self.reconcile_inner(subscription, today)
            .instrument(span)
            .await
    }

    async fn reconcile_inner(&self, subscription: &Subscription, today: NaiveDate) -> SubscriptionReport {
        let mut report =
            SubscriptionReport::new(subscription.id.clone(), subscription.series_code.clone());

        let snapshot = match self
            .fetch_policy
            .fetch(self.source.as_ref(), &subscription.series_code)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "series fetch failed; subscription stays eligible");
                report.fail(ReconcileStage::Fetching, err.to_string());
                return report;
            }
        };
        let provider_update = snapshot.provider_update_date();
        report.provider_update_date = Some(provider_update);

        let assessment = assess(subscription, &snapshot);
        debug!(?assessment, %provider_update, "subscription assessed");

        if assessment != Assessment::Unchanged {
            self.write(&mut report, CheckpointField::KnownUpdate, provider_update)
                .await;
        }

        match assessment {
            Assessment::Unchanged => {
                report.outcome = ReconciliationOutcome::Unchanged;
            }
            Assessment::InsufficientHistory => {
                report.outcome = ReconciliationOutcome::UpdatedNoAlert;
            }
            Assessment::BelowThreshold(change) => {
                report.margin = Some(change);
                report.outcome = ReconciliationOutcome::UpdatedNoAlert;
            }
            Assessment::MarginFailed(err) => {
                error!(error = %err, "margin could not be computed");
                report.fail(ReconcileStage::Evaluating, err.to_string());
            }
            Assessment::Alert(change) => {
                report.margin = Some(change);
                let alert = SeriesAlert {
                    series_code: subscription.series_code.clone(),
                    subscriber_address: subscription.subscriber_address.clone(),
                    margin: change,
                    provider_update_date: provider_update,
                };
                match self.notify_policy.notify(self.notifier.as_ref(), &alert).await {
                    Delivery::Delivered => {
                        info!(margin = %change, threshold = %subscription.threshold_margin, "alert delivered");
                        self.write(&mut report, CheckpointField::Alerted, today).await;
                        report.outcome = ReconciliationOutcome::UpdatedAlerted;
                    }
                    Delivery::Rejected => {
                        warn!(margin = %change, "alert delivery reported failure");
                        report.outcome = ReconciliationOutcome::AlertAttemptFailed;
                    }
                    Delivery::TimedOut(limit) => {
                        warn!(timeout = ?limit, "alert delivery timed out");
                        report.fail(
                            ReconcileStage::Notifying,
                            format!("notifier timed out after {limit:?}"),
                        );
                    }
                }
            }
        }

        self.write(&mut report, CheckpointField::Checked, today).await;
        info!(outcome = %report.outcome, "subscription reconciled");
        report
    }

    async fn write(&self, report: &mut SubscriptionReport, field: CheckpointField, date: NaiveDate) {
        let store = self.store.clone();
        let id = report.subscription_id.clone();
        let span = Span::current();
        // Backends block on SQLite; keep them off the async workers.
        let result = tokio::task::spawn_blocking(move || {
            span.in_scope(|| checkpoint(&store, &id, field, date))
        })
        .await
        .unwrap_or_else(|err| Err(StoreError::Storage(format!("checkpoint task failed: {err}"))));
        if let Err(err) = result {
            error!(field = %field, error = %err, "checkpoint write failed");
            report.checkpoint_errors.push(format!("{field}: {err}"));
        }
    }
}

fn checkpoint(
    store: &SubscriptionStore,
    id: &SubscriptionId,
    field: CheckpointField,
    date: NaiveDate,
) -> StoreResult<()> {
    match field {
        CheckpointField::Checked => store.update_checked(id, date),
        CheckpointField::KnownUpdate => store.update_known_update(id, date),
        CheckpointField::Alerted => store.update_alerted(id, date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rust_decimal_macros::dec;
    use serieswatch_core::{Observation, SeriesCode};
    use serieswatch_data::SourceError;
    use serieswatch_store::{InMemorySubscriptionBackend, NewSubscription, SubscriptionBackend};
    use serieswatch_test_utils::{RecordingNotifier, ScriptedSource};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn code() -> SeriesCode {
        "BM12_TJOVER12".parse().unwrap()
    }

    fn snapshot(values: &[(u32, Decimal)]) -> SeriesSnapshot {
        let observations = values
            .iter()
            .map(|(d, value)| Observation::new(day(*d), *value))
            .collect();
        SeriesSnapshot::from_observations(code(), observations).unwrap()
    }

    struct Harness {
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
        store: SubscriptionStore,
        engine: ReconciliationEngine,
    }

    fn harness(notifier: RecordingNotifier) -> Harness {
        let source = Arc::new(ScriptedSource::new());
        let notifier = Arc::new(notifier);
        let store = SubscriptionStore::in_memory();
        let engine = ReconciliationEngine::new(source.clone(), notifier.clone(), store.clone())
            .with_fetch_policy(CallPolicy::new(Duration::from_millis(100), 0, Duration::ZERO))
            .with_notify_policy(CallPolicy::new(Duration::from_millis(100), 0, Duration::ZERO));
        Harness {
            source,
            notifier,
            store,
            engine,
        }
    }

    impl Harness {
        fn subscribe(&self, threshold: &str, known: Option<&str>) -> Subscription {
            self.store
                .create(code().as_str(), "reader@example.com", threshold, known)
                .unwrap()
        }

        fn reload(&self, subscription: &Subscription) -> Subscription {
            self.store
                .list()
                .unwrap()
                .into_iter()
                .find(|s| s.id == subscription.id)
                .unwrap()
        }
    }

    #[tokio::test]
    async fn first_time_with_single_observation_records_checkpoints() {
        let h = harness(RecordingNotifier::new());
        let sub = h.subscribe("5", None);
        h.source.push(&code(), Ok(snapshot(&[(1, dec!(10))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::UpdatedNoAlert);

        let stored = h.reload(&sub);
        assert_eq!(stored.last_known_update_date, Some(day(1)));
        assert_eq!(stored.last_checked_date, Some(day(20)));
        assert_eq!(stored.last_alert_date, None);
        assert_eq!(h.notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn steady_series_only_marks_checked() {
        let h = harness(RecordingNotifier::new());
        let sub = h.subscribe("5", Some("2024-04-02"));
        h.source
            .push(&code(), Ok(snapshot(&[(2, dec!(150)), (1, dec!(100))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::Unchanged);
        assert_eq!(report.margin, None);

        let stored = h.reload(&sub);
        assert_eq!(stored.last_known_update_date, Some(day(2)));
        assert_eq!(stored.last_checked_date, Some(day(20)));
        assert_eq!(h.notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn update_past_threshold_alerts_and_records_delivery() {
        let h = harness(RecordingNotifier::new());
        let sub = h.subscribe("5", Some("2024-04-01"));
        h.source
            .push(&code(), Ok(snapshot(&[(1, dec!(100)), (2, dec!(150))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::UpdatedAlerted);
        assert_eq!(report.margin, Some(dec!(50)));

        let alerts = h.notifier.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].margin, dec!(50));
        assert_eq!(alerts[0].provider_update_date, day(2));

        let stored = h.reload(&sub);
        assert_eq!(stored.last_known_update_date, Some(day(2)));
        assert_eq!(stored.last_alert_date, Some(day(20)));
        assert_eq!(stored.last_checked_date, Some(day(20)));
    }

    #[tokio::test]
    async fn rejected_alert_still_advances_known_and_checked() {
        let h = harness(RecordingNotifier::failing());
        let sub = h.subscribe("5", None);
        h.source
            .push(&code(), Ok(snapshot(&[(2, dec!(90)), (1, dec!(100))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::AlertAttemptFailed);
        assert_eq!(h.notifier.attempts(), 1);

        let stored = h.reload(&sub);
        assert_eq!(stored.last_alert_date, None);
        assert_eq!(stored.last_known_update_date, Some(day(2)));
        assert_eq!(stored.last_checked_date, Some(day(20)));
    }

    #[tokio::test]
    async fn threshold_boundary_is_inclusive_in_both_directions() {
        for (latest, expected) in [
            (dec!(105), ReconciliationOutcome::UpdatedAlerted),
            (dec!(95), ReconciliationOutcome::UpdatedAlerted),
            (dec!(104.999), ReconciliationOutcome::UpdatedNoAlert),
        ] {
            let h = harness(RecordingNotifier::new());
            let sub = h.subscribe("5", None);
            h.source
                .push(&code(), Ok(snapshot(&[(2, latest), (1, dec!(100))])));
            let report = h.engine.reconcile(&sub, day(20)).await;
            assert_eq!(report.outcome, expected, "latest value {latest}");
        }
    }

    #[tokio::test]
    async fn zero_baseline_fails_but_keeps_checkpoints() {
        let h = harness(RecordingNotifier::new());
        let sub = h.subscribe("5", None);
        h.source
            .push(&code(), Ok(snapshot(&[(2, dec!(3)), (1, dec!(0))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::Failed);
        assert_eq!(report.failed_stage, Some(ReconcileStage::Evaluating));
        assert!(report.diagnostic.is_some());

        let stored = h.reload(&sub);
        assert_eq!(stored.last_known_update_date, Some(day(2)));
        assert_eq!(stored.last_checked_date, Some(day(20)));
        assert_eq!(h.notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_subscription_untouched() {
        let h = harness(RecordingNotifier::new());
        let sub = h.subscribe("5", None);
        h.source
            .push(&code(), Err(SourceError::Transient("connection reset".into())));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::Failed);
        assert_eq!(report.failed_stage, Some(ReconcileStage::Fetching));
        assert_eq!(h.reload(&sub), sub);
    }

    #[tokio::test]
    async fn slow_notifier_counts_as_failure_without_alert_date() {
        let h = harness(RecordingNotifier::new().with_delay(Duration::from_millis(500)));
        let sub = h.subscribe("1", None);
        h.source
            .push(&code(), Ok(snapshot(&[(2, dec!(120)), (1, dec!(100))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::Failed);
        assert_eq!(report.failed_stage, Some(ReconcileStage::Notifying));

        let stored = h.reload(&sub);
        assert_eq!(stored.last_alert_date, None);
        assert_eq!(stored.last_checked_date, Some(day(20)));
    }

    #[tokio::test]
    async fn checkpoint_failures_are_reported_without_changing_outcome() {
        let h = harness(RecordingNotifier::new());
        let sub = h.subscribe("5", None);
        h.store.delete(code().as_str(), "reader@example.com").unwrap();
        h.source.push(&code(), Ok(snapshot(&[(1, dec!(10))])));

        let report = h.engine.reconcile(&sub, day(20)).await;
        assert_eq!(report.outcome, ReconciliationOutcome::UpdatedNoAlert);
        assert_eq!(report.checkpoint_errors.len(), 2);
    }

    struct SlowBackend {
        inner: InMemorySubscriptionBackend,
        delay: Duration,
    }

    impl SubscriptionBackend for SlowBackend {
        fn insert(&self, record: &NewSubscription) -> StoreResult<Subscription> {
            self.inner.insert(record)
        }

        fn remove(&self, code: &SeriesCode, address: &str) -> StoreResult<Vec<Subscription>> {
            self.inner.remove(code, address)
        }

        fn write_checkpoint(
            &self,
            id: &SubscriptionId,
            field: CheckpointField,
            date: NaiveDate,
        ) -> StoreResult<bool> {
            std::thread::sleep(self.delay);
            self.inner.write_checkpoint(id, field, date)
        }

        fn eligible(&self, reference: NaiveDate) -> StoreResult<Vec<Subscription>> {
            self.inner.eligible(reference)
        }

        fn all(&self) -> StoreResult<Vec<Subscription>> {
            self.inner.all()
        }
    }

    #[tokio::test]
    async fn slow_checkpoint_writes_do_not_stall_other_tasks() {
        let store = SubscriptionStore::new(Arc::new(SlowBackend {
            inner: InMemorySubscriptionBackend::new(),
            delay: Duration::from_millis(200),
        }));
        let source = Arc::new(ScriptedSource::new());
        let engine = ReconciliationEngine::new(
            source.clone(),
            Arc::new(RecordingNotifier::new()),
            store.clone(),
        );
        let sub = store
            .create(code().as_str(), "reader@example.com", "5", None)
            .unwrap();
        source.push(&code(), Ok(snapshot(&[(1, dec!(10))])));

        let started = std::time::Instant::now();
        let (report, ticked) = tokio::join!(engine.reconcile(&sub, day(20)), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        });
        assert!(ticked < Duration::from_millis(150), "timer stalled for {ticked:?}");
        assert_eq!(report.outcome, ReconciliationOutcome::UpdatedNoAlert);
        assert!(report.checkpoint_errors.is_empty());
        assert_eq!(store.list().unwrap()[0].last_checked_date, Some(day(20)));
    }

    #[test]
    fn assessment_distinguishes_unchanged_from_update() {
        let mut sub = Subscription {
            id: "s".into(),
            series_code: code(),
            subscriber_address: "a@example.com".into(),
            threshold_margin: dec!(10),
            last_known_update_date: Some(day(2)),
            last_checked_date: None,
            last_alert_date: None,
            created_at: chrono::Utc::now(),
        };
        let snap = snapshot(&[(2, dec!(100)), (1, dec!(50))]);
        assert_eq!(assess(&sub, &snap), Assessment::Unchanged);
        sub.last_known_update_date = Some(day(1));
        assert_eq!(assess(&sub, &snap), Assessment::Alert(dec!(100)));
        sub.threshold_margin = dec!(100.01);
        assert_eq!(assess(&sub, &snap), Assessment::BelowThreshold(dec!(100)));
    }
}
