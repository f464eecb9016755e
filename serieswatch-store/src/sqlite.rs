use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serieswatch_core::{CheckpointField, SeriesCode, Subscription, SubscriptionId, DATE_FORMAT};
use uuid::Uuid;

use crate::{NewSubscription, StoreError, StoreResult, SubscriptionBackend};

const SUBSCRIPTION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id TEXT PRIMARY KEY,
    series_code TEXT NOT NULL,
    subscriber_address TEXT NOT NULL,
    threshold_margin TEXT NOT NULL,
    last_known_update_date TEXT,
    last_checked_date TEXT,
    last_alert_date TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS subscriptions_idx_series_subscriber
    ON subscriptions(series_code, subscriber_address);
CREATE INDEX IF NOT EXISTS subscriptions_idx_last_checked
    ON subscriptions(last_checked_date);
"#;

const SELECT_COLUMNS: &str = "SELECT id, series_code, subscriber_address, threshold_margin,
        last_known_update_date, last_checked_date, last_alert_date, created_at
     FROM subscriptions";

/// SQLite-backed subscription storage used by the scheduled runtime.
#[derive(Clone, Debug)]
pub struct SqliteSubscriptionBackend {
    path: PathBuf,
}

impl SqliteSubscriptionBackend {
    pub fn new(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let backend = Self { path: path.into() };
        backend.initialize_schema()?;
        Ok(backend)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(SUBSCRIPTION_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        // Workers write checkpoints from several connections at once.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        Ok(conn)
    }

    fn select(&self, clause: &str, params: impl rusqlite::Params) -> StoreResult<Vec<Subscription>> {
        let conn = self.connect()?;
        let sql = format!("{SELECT_COLUMNS} {clause}");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_subscription(row)?);
        }
        Ok(records)
    }
}

impl SubscriptionBackend for SqliteSubscriptionBackend {
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
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO subscriptions (
                id, series_code, subscriber_address, threshold_margin,
                last_known_update_date, last_checked_date, last_alert_date, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6)",
            params![
                subscription.id.as_str(),
                subscription.series_code.as_str(),
                subscription.subscriber_address,
                subscription.threshold_margin.to_string(),
                subscription.last_known_update_date.map(format_date),
                subscription.created_at.to_rfc3339(),
            ],
        )?;
        Ok(subscription)
    }

    fn remove(
        &self,
        series_code: &SeriesCode,
        subscriber_address: &str,
    ) -> StoreResult<Vec<Subscription>> {
        let matching = self.select(
            "WHERE series_code = ?1 AND subscriber_address = ?2 ORDER BY created_at, id",
            params![series_code.as_str(), subscriber_address],
        )?;
        if matching.is_empty() {
            return Ok(matching);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        for record in &matching {
            tx.execute(
                "DELETE FROM subscriptions WHERE id = ?1",
                params![record.id.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(matching)
    }

    fn write_checkpoint(
        &self,
        id: &SubscriptionId,
        field: CheckpointField,
        date: NaiveDate,
    ) -> StoreResult<bool> {
        let conn = self.connect()?;
        let sql = format!(
            "UPDATE subscriptions SET {} = ?1 WHERE id = ?2",
            checkpoint_column(field)
        );
        let changed = conn.execute(&sql, params![format_date(date), id.as_str()])?;
        Ok(changed > 0)
    }

    fn eligible(&self, reference: NaiveDate) -> StoreResult<Vec<Subscription>> {
        self.select(
            "WHERE last_checked_date IS NULL OR last_checked_date <> ?1 ORDER BY created_at, id",
            params![format_date(reference)],
        )
    }

    fn all(&self) -> StoreResult<Vec<Subscription>> {
        self.select("ORDER BY created_at, id", [])
    }
}

fn checkpoint_column(field: CheckpointField) -> &'static str {
    match field {
        CheckpointField::Checked => "last_checked_date",
        CheckpointField::KnownUpdate => "last_known_update_date",
        CheckpointField::Alerted => "last_alert_date",
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(column: &str, value: Option<String>) -> StoreResult<Option<NaiveDate>> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|err| {
                StoreError::Serialization(format!("invalid {column} {raw}: {err}"))
            })
        })
        .transpose()
}

fn row_to_subscription(row: &rusqlite::Row<'_>) -> StoreResult<Subscription> {
    let id: String = row.get(0)?;
    let series_code_str: String = row.get(1)?;
    let subscriber_address: String = row.get(2)?;
    let threshold_str: String = row.get(3)?;
    let known_update: Option<String> = row.get(4)?;
    let checked: Option<String> = row.get(5)?;
    let alerted: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;

    let series_code = SeriesCode::from_str(&series_code_str).map_err(|err| {
        StoreError::Serialization(format!("invalid series code {series_code_str}: {err}"))
    })?;
    let threshold_margin = Decimal::from_str(&threshold_str).map_err(|err| {
        StoreError::Serialization(format!("invalid threshold {threshold_str}: {err}"))
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|err| {
            StoreError::Serialization(format!("invalid timestamp {created_at_str}: {err}"))
        })?
        .with_timezone(&Utc);

    Ok(Subscription {
        id: SubscriptionId::new(id),
        series_code,
        subscriber_address,
        threshold_margin,
        last_known_update_date: parse_date("last_known_update_date", known_update)?,
        last_checked_date: parse_date("last_checked_date", checked)?,
        last_alert_date: parse_date("last_alert_date", alerted)?,
        created_at,
    })
}
