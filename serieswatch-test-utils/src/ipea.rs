use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

/// One series published by the mock provider.
#[derive(Clone, Debug)]
pub struct MockSeries {
    pub code: String,
    pub name: String,
    pub base: String,
    pub source: String,
    pub frequency: String,
    pub unit: String,
    pub theme: Option<i64>,
    pub active: bool,
    pub observations: Vec<(NaiveDate, Option<Decimal>)>,
}

impl MockSeries {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            name: format!("{code} (mock)"),
            code,
            base: "Macroeconômico".into(),
            source: "IPEA".into(),
            frequency: "Mensal".into(),
            unit: "R$".into(),
            theme: None,
            active: true,
            observations: Vec::new(),
        }
    }

    pub fn with_observation(mut self, date: NaiveDate, value: Decimal) -> Self {
        self.observations.push((date, Some(value)));
        self
    }

    /// Row the provider publishes without a value.
    pub fn with_missing(mut self, date: NaiveDate) -> Self {
        self.observations.push((date, None));
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_theme(mut self, theme: i64) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    fn values_json(&self) -> Vec<Value> {
        self.observations
            .iter()
            .map(|(date, value)| {
                json!({
                    "SERCODIGO": self.code,
                    "VALDATA": format!("{}T00:00:00-03:00", date.format("%Y-%m-%d")),
                    "VALVALOR": value.and_then(|v| v.to_f64()),
                    "NIVNOME": "",
                    "TERCODIGO": ""
                })
            })
            .collect()
    }

    fn metadata_json(&self) -> Value {
        let latest = self.observations.iter().map(|(date, _)| *date).max();
        json!({
            "SERCODIGO": self.code,
            "SERNOME": self.name,
            "SERATUALIZACAO": latest.map(|d| format!("{}T00:00:00-03:00", d.format("%Y-%m-%d"))),
            "BASNOME": self.base,
            "FNTSIGLA": self.source,
            "FNTNOME": self.source,
            "PERNOME": self.frequency,
            "UNINOME": self.unit,
            "SERSTATUS": if self.active { "A" } else { "I" },
            "TEMCODIGO": self.theme
        })
    }
}

/// Configuration for [`MockIpea`].
#[derive(Clone, Debug, Default)]
pub struct MockIpeaConfig {
    series: Vec<MockSeries>,
    themes: Vec<(i64, String)>,
    status_overrides: HashMap<String, u16>,
    delay: Duration,
}

impl MockIpeaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: MockSeries) -> Self {
        self.series.push(series);
        self
    }

    pub fn with_theme(mut self, code: i64, name: impl Into<String>) -> Self {
        self.themes.push((code, name.into()));
        self
    }

    /// Answer value requests for `code` with `status` and an empty body.
    pub fn with_status(mut self, code: impl Into<String>, status: u16) -> Self {
        self.status_overrides.insert(code.into().to_uppercase(), status);
        self
    }

    /// Delay applied before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

struct MockState {
    config: MockIpeaConfig,
    requests: AtomicUsize,
}

/// In-process HTTP server speaking the subset of the ipeadata OData API the client uses.
pub struct MockIpea {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MockIpea {
    pub async fn start(config: MockIpeaConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").context("bind mock ipea listener")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let state = Arc::new(MockState {
            config,
            requests: AtomicUsize::new(0),
        });

        let service_state = state.clone();
        let make_service = make_service_fn(move |_conn| {
            let state = service_state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(handle(&state, req).await) }
                }))
            }
        });

        let (tx, rx) = oneshot::channel::<()>();
        let server = Server::from_tcp(listener)?
            .serve(make_service)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            });
        let task = tokio::spawn(async move {
            if let Err(err) = server.await {
                warn!(error = %err, "mock ipea server exited with error");
            }
        });

        Ok(Self {
            addr,
            state,
            shutdown: Some(tx),
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/odata4", self.addr)
    }

    /// Number of requests served so far.
    pub fn requests(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for MockIpea {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(state: &MockState, req: Request<Body>) -> Response<Body> {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }
    let path = req.uri().path().replace("%27", "'").replace("%20", " ");
    let resource = path.rsplit('/').next().unwrap_or_default();

    if let Some(code) = argument(resource, "ValoresSerie(SERCODIGO=") {
        if let Some(status) = state.config.status_overrides.get(&code.to_uppercase()) {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return respond(status, Value::Null);
        }
        let values = find(state, &code)
            .map(MockSeries::values_json)
            .unwrap_or_default();
        return odata(values);
    }
    if let Some(code) = argument(resource, "Metadados(") {
        let rows = find(state, &code)
            .map(|series| vec![series.metadata_json()])
            .unwrap_or_default();
        return odata(rows);
    }
    match resource {
        "Metadados" => odata(
            state
                .config
                .series
                .iter()
                .map(MockSeries::metadata_json)
                .collect(),
        ),
        "Temas" => odata(
            state
                .config
                .themes
                .iter()
                .map(|(code, name)| json!({ "TEMCODIGO": code, "TEMCODIGO_PAI": null, "TEMNOME": name }))
                .collect(),
        ),
        _ => respond(StatusCode::NOT_FOUND, json!({ "error": "unknown resource" })),
    }
}

/// Extract `X` from `prefix'X')`.
fn argument(resource: &str, prefix: &str) -> Option<String> {
    let rest = resource.strip_prefix(prefix)?;
    let inner = rest.strip_prefix('\'')?.strip_suffix("')")?;
    Some(inner.to_string())
}

fn find<'a>(state: &'a MockState, code: &str) -> Option<&'a MockSeries> {
    state
        .config
        .series
        .iter()
        .find(|series| series.code.eq_ignore_ascii_case(code))
}

fn odata(rows: Vec<Value>) -> Response<Body> {
    respond(
        StatusCode::OK,
        json!({ "@odata.context": "mock", "value": rows }),
    )
}

fn respond(status: StatusCode, body: Value) -> Response<Body> {
    let body = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serieswatch_core::SeriesCode;
    use serieswatch_data::{CatalogPolicy, IpeaClient, SeriesCatalog, SeriesSource, SourceError};

    #[tokio::test]
    async fn serves_values_and_metadata() -> Result<()> {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mock = MockIpea::start(
            MockIpeaConfig::new()
                .with_series(MockSeries::new("ABC").with_observation(day, Decimal::new(125, 1))),
        )
        .await?;

        let values: Value = reqwest::get(format!("{}/ValoresSerie(SERCODIGO='ABC')", mock.base_url()))
            .await?
            .json()
            .await?;
        assert_eq!(values["value"][0]["VALVALOR"], 12.5);

        let missing: Value = reqwest::get(format!("{}/Metadados('NOPE')", mock.base_url()))
            .await?
            .json()
            .await?;
        assert!(missing["value"].as_array().unwrap().is_empty());
        assert_eq!(mock.requests(), 2);
        mock.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn catalog_refresh_keeps_active_national_monetary_series() -> Result<()> {
        let mock = MockIpea::start(
            MockIpeaConfig::new()
                .with_series(MockSeries::new("KEEP").with_source("BCB").with_theme(7))
                .with_series(MockSeries::new("REG").with_base("Regional").with_theme(7))
                .with_series(MockSeries::new("PCT").with_unit("%").with_theme(8))
                .with_series(MockSeries::new("OLD").inactive().with_theme(8))
                .with_theme(7, "Renda")
                .with_theme(8, "Preços"),
        )
        .await?;
        let client = IpeaClient::new(mock.base_url());
        let mut catalog = SeriesCatalog::new(CatalogPolicy::default());
        assert!(catalog.refreshed_at().is_none());

        catalog.refresh(&client).await?;
        assert!(catalog.refreshed_at().is_some());
        assert_eq!(catalog.len(), 1);
        let kept = catalog.find("keep").expect("KEEP admitted");
        assert_eq!(kept.source_acronym, "BCB");
        assert_eq!(kept.theme_code, Some(7));
        assert_eq!(catalog.sources("Mensal"), vec!["BCB".to_string()]);
        let themes: Vec<_> = catalog.themes("Mensal").iter().map(|t| t.name.as_str()).collect();
        assert_eq!(themes, vec!["Renda"]);

        let unknown: SeriesCode = "UNKNOWN".parse().unwrap();
        assert!(matches!(
            client.fetch_series(&unknown).await,
            Err(SourceError::NotFound(code)) if code == "UNKNOWN"
        ));
        // Metadados, Temas, then values and metadata for the unknown code.
        assert_eq!(mock.requests(), 4);
        mock.shutdown().await;
        Ok(())
    }
}
