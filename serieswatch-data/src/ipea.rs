use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serieswatch_core::{Observation, SeriesCode, DATE_FORMAT};
use tracing::{debug, warn};

use crate::catalog::{SeriesMetadata, Theme};
use crate::{RequestLimiter, SeriesSnapshot, SeriesSource, SourceError, SourceResult};

pub const IPEA_BASE_URL: &str = "http://www.ipeadata.gov.br/api/odata4";

/// OData envelope used by every ipeadata endpoint.
#[derive(Deserialize)]
struct ODataEnvelope<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
struct RawValue {
    #[serde(rename = "VALDATA")]
    date: String,
    #[serde(rename = "VALVALOR")]
    value: Option<Decimal>,
}

#[derive(Deserialize)]
struct RawMetadata {
    #[serde(rename = "SERCODIGO")]
    code: String,
    #[serde(rename = "SERNOME", default)]
    name: Option<String>,
    #[serde(rename = "SERATUALIZACAO", default)]
    last_update: Option<String>,
    #[serde(rename = "BASNOME", default)]
    base: Option<String>,
    #[serde(rename = "FNTSIGLA", default)]
    source_acronym: Option<String>,
    #[serde(rename = "FNTNOME", default)]
    source_name: Option<String>,
    #[serde(rename = "PERNOME", default)]
    frequency: Option<String>,
    #[serde(rename = "UNINOME", default)]
    unit: Option<String>,
    #[serde(rename = "SERSTATUS", default)]
    status: Option<String>,
    #[serde(rename = "TEMCODIGO", default)]
    theme_code: Option<i64>,
}

#[derive(Deserialize)]
struct RawTheme {
    #[serde(rename = "TEMCODIGO")]
    code: i64,
    #[serde(rename = "TEMCODIGO_PAI", default)]
    parent: Option<i64>,
    #[serde(rename = "TEMNOME", default)]
    name: Option<String>,
}

/// HTTP client for the ipeadata OData v4 API.
#[derive(Clone, Debug)]
pub struct IpeaClient {
    client: Client,
    base_url: String,
    limiter: RequestLimiter,
}

impl IpeaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            limiter: RequestLimiter::unlimited(),
        }
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: RequestLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{path}")
    }

    /// Observations of `code` in provider order; rows without a value are dropped.
    pub async fn fetch_values(&self, code: &SeriesCode) -> SourceResult<Vec<Observation>> {
        let path = format!("ValoresSerie(SERCODIGO='{code}')");
        let Some(rows) = self.get_odata::<RawValue>(&path).await? else {
            return Err(SourceError::NotFound(code.to_string()));
        };
        let total = rows.len();
        let observations: Vec<Observation> = rows
            .into_iter()
            .filter_map(|row| {
                let value = row.value?;
                match parse_provider_date(&row.date) {
                    Some(date) => Some(Observation::new(date, value)),
                    None => {
                        warn!(series = %code, raw = %row.date, "skipping observation with unparseable date");
                        None
                    }
                }
            })
            .collect();
        debug!(series = %code, total, kept = observations.len(), "fetched ipea values");
        Ok(observations)
    }

    /// Metadata of a single series, `None` when the provider does not know it.
    pub async fn fetch_metadata(&self, code: &SeriesCode) -> SourceResult<Option<SeriesMetadata>> {
        let path = format!("Metadados('{code}')");
        let rows = self.get_odata::<RawMetadata>(&path).await?.unwrap_or_default();
        Ok(rows.into_iter().next().map(SeriesMetadata::from))
    }

    /// Metadata of every series published by the provider.
    pub async fn fetch_catalog(&self) -> SourceResult<Vec<SeriesMetadata>> {
        let rows = self
            .get_odata::<RawMetadata>("Metadados")
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(SeriesMetadata::from).collect())
    }

    pub async fn fetch_themes(&self) -> SourceResult<Vec<Theme>> {
        let rows = self.get_odata::<RawTheme>("Temas").await?.unwrap_or_default();
        Ok(rows
            .into_iter()
            .map(|raw| Theme {
                code: raw.code,
                parent: raw.parent,
                name: raw.name.unwrap_or_default(),
            })
            .collect())
    }

    /// GET an OData collection. `Ok(None)` means the provider answered 404.
    async fn get_odata<T: DeserializeOwned>(&self, path: &str) -> SourceResult<Option<Vec<T>>> {
        self.limiter.until_ready().await;
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| SourceError::Transient(format!("request to {url} failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|err| SourceError::Transient(format!("failed to read ipea body: {err}")))?;
        debug!(
            "ipea response for {} (status {}): {}",
            path,
            status,
            truncate(&body, 512)
        );
        if !status.is_success() {
            return Err(SourceError::Transient(format!(
                "ipea responded with status {}: {}",
                status,
                truncate(&body, 256)
            )));
        }
        let envelope: ODataEnvelope<T> = serde_json::from_str(&body).map_err(|err| {
            SourceError::Transient(format!(
                "failed to parse ipea response: {} (body snippet: {})",
                err,
                truncate(&body, 256)
            ))
        })?;
        Ok(Some(envelope.value))
    }
}

#[async_trait]
impl SeriesSource for IpeaClient {
    async fn fetch_series(&self, code: &SeriesCode) -> SourceResult<SeriesSnapshot> {
        let observations = self.fetch_values(code).await?;
        if observations.is_empty() {
            // An unknown code and a known-but-empty series both come back as an empty list.
            return match self.fetch_metadata(code).await? {
                Some(_) => Err(SourceError::EmptyResult(code.to_string())),
                None => Err(SourceError::NotFound(code.to_string())),
            };
        }
        SeriesSnapshot::from_observations(code.clone(), observations)
    }
}

impl From<RawMetadata> for SeriesMetadata {
    fn from(raw: RawMetadata) -> Self {
        SeriesMetadata {
            code: raw.code,
            name: raw.name.unwrap_or_default(),
            base: raw.base.unwrap_or_default(),
            source_acronym: raw.source_acronym.unwrap_or_default(),
            source_name: raw.source_name.unwrap_or_default(),
            frequency: raw.frequency.unwrap_or_default(),
            unit: raw.unit.unwrap_or_default(),
            theme_code: raw.theme_code,
            active: raw.status.as_deref() != Some("I"),
            last_update: raw.last_update.as_deref().and_then(parse_provider_date),
        }
    }
}

/// Date part of an ipeadata timestamp such as `2024-03-01T00:00:00-03:00`.
pub(crate) fn parse_provider_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split('T').next()?;
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
