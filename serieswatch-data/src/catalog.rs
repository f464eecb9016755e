use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::{IpeaClient, SourceResult};

/// Descriptive metadata for a published series.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeriesMetadata {
    pub code: String,
    pub name: String,
    /// Top-level database the series belongs to (macroeconomic, regional, social).
    pub base: String,
    pub source_acronym: String,
    pub source_name: String,
    pub frequency: String,
    pub unit: String,
    pub theme_code: Option<i64>,
    pub active: bool,
    pub last_update: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub code: i64,
    pub parent: Option<i64>,
    pub name: String,
}

/// Rules deciding which provider series enter the catalog at refresh time.
#[derive(Clone, Debug)]
pub struct CatalogPolicy {
    /// Keep only series whose unit contains one of these markers. Empty keeps everything.
    pub unit_markers: Vec<String>,
    /// Drop series whose base matches one of these names (case-insensitive).
    pub excluded_bases: Vec<String>,
    pub include_inactive: bool,
}

impl Default for CatalogPolicy {
    fn default() -> Self {
        Self {
            unit_markers: vec!["$".to_string()],
            excluded_bases: vec!["Regional".to_string()],
            include_inactive: false,
        }
    }
}

impl CatalogPolicy {
    fn admits(&self, entry: &SeriesMetadata) -> bool {
        if !self.include_inactive
            && (!entry.active || entry.name.to_uppercase().contains("INATIVA"))
        {
            return false;
        }
        if self
            .excluded_bases
            .iter()
            .any(|base| entry.base.eq_ignore_ascii_case(base))
        {
            return false;
        }
        self.unit_markers.is_empty()
            || self
                .unit_markers
                .iter()
                .any(|marker| entry.unit.contains(marker.as_str()))
    }
}

/// Search criteria; empty lists match everything.
#[derive(Clone, Debug, Default)]
pub struct CatalogFilter {
    pub frequency: Option<String>,
    pub sources: Vec<String>,
    pub themes: Vec<i64>,
}

impl CatalogFilter {
    fn matches(&self, entry: &SeriesMetadata) -> bool {
        if let Some(frequency) = &self.frequency {
            if !entry.frequency.eq_ignore_ascii_case(frequency) {
                return false;
            }
        }
        if !self.sources.is_empty()
            && !self
                .sources
                .iter()
                .any(|source| entry.source_acronym.eq_ignore_ascii_case(source))
        {
            return false;
        }
        if !self.themes.is_empty() {
            match entry.theme_code {
                Some(code) if self.themes.contains(&code) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Cached copy of the provider catalog.
///
/// The cache is owned by whoever builds it and only changes through [`SeriesCatalog::refresh`]
/// or [`SeriesCatalog::replace`].
#[derive(Clone, Debug, Default)]
pub struct SeriesCatalog {
    policy: CatalogPolicy,
    entries: Vec<SeriesMetadata>,
    themes: Vec<Theme>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl SeriesCatalog {
    pub fn new(policy: CatalogPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Reload series metadata and themes from the provider.
    pub async fn refresh(&mut self, client: &IpeaClient) -> SourceResult<()> {
        let entries = client.fetch_catalog().await?;
        let themes = client.fetch_themes().await?;
        self.replace(entries, themes, Utc::now());
        Ok(())
    }

    /// Install a freshly fetched catalog, applying the admission policy.
    pub fn replace(&mut self, entries: Vec<SeriesMetadata>, themes: Vec<Theme>, at: DateTime<Utc>) {
        let total = entries.len();
        self.entries = entries
            .into_iter()
            .filter(|entry| self.policy.admits(entry))
            .collect();
        self.themes = themes;
        self.refreshed_at = Some(at);
        info!(
            total,
            admitted = self.entries.len(),
            themes = self.themes.len(),
            "series catalog refreshed"
        );
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    /// Whether the catalog was never loaded or is older than `max_age` at `now`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match self.refreshed_at {
            Some(at) => now - at > max_age,
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, code: &str) -> Option<&SeriesMetadata> {
        self.entries
            .iter()
            .find(|entry| entry.code.eq_ignore_ascii_case(code))
    }

    pub fn search(&self, filter: &CatalogFilter) -> Vec<&SeriesMetadata> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .collect()
    }

    /// Distinct source acronyms publishing at `frequency`.
    pub fn sources(&self, frequency: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.frequency.eq_ignore_ascii_case(frequency))
            .map(|entry| entry.source_acronym.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Themes that have at least one series at `frequency`.
    pub fn themes(&self, frequency: &str) -> Vec<&Theme> {
        let codes: BTreeSet<i64> = self
            .entries
            .iter()
            .filter(|entry| entry.frequency.eq_ignore_ascii_case(frequency))
            .filter_map(|entry| entry.theme_code)
            .collect();
        self.themes
            .iter()
            .filter(|theme| codes.contains(&theme.code))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, base: &str, source: &str, unit: &str, theme: i64) -> SeriesMetadata {
        SeriesMetadata {
            code: code.to_string(),
            name: format!("{code} series"),
            base: base.to_string(),
            source_acronym: source.to_string(),
            source_name: source.to_string(),
            frequency: "Mensal".to_string(),
            unit: unit.to_string(),
            theme_code: Some(theme),
            active: true,
            last_update: None,
        }
    }

    fn loaded() -> SeriesCatalog {
        let mut inactive = entry("OLD", "Macroeconômico", "BCB", "R$", 1);
        inactive.name = "Série INATIVA".to_string();
        let mut catalog = SeriesCatalog::new(CatalogPolicy::default());
        catalog.replace(
            vec![
                entry("GAC12_SALMINRE12", "Macroeconômico", "IPEA", "R$", 1),
                entry("BM12_CRLIN12", "Macroeconômico", "BCB", "R$ (milhões)", 2),
                entry("REG1", "Regional", "IBGE", "R$", 1),
                entry("PCT", "Macroeconômico", "IBGE", "%", 1),
                inactive,
            ],
            vec![
                Theme { code: 1, parent: None, name: "Renda".into() },
                Theme { code: 2, parent: None, name: "Crédito".into() },
                Theme { code: 3, parent: None, name: "Vazio".into() },
            ],
            Utc::now(),
        );
        catalog
    }

    #[test]
    fn refresh_policy_drops_regional_inactive_and_non_monetary() {
        let catalog = loaded();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.find("gac12_salminre12").is_some());
        assert!(catalog.find("REG1").is_none());
        assert!(catalog.find("PCT").is_none());
        assert!(catalog.find("OLD").is_none());
    }

    #[test]
    fn search_combines_filters() {
        let catalog = loaded();
        let filter = CatalogFilter {
            frequency: Some("mensal".into()),
            sources: vec!["bcb".into()],
            themes: Vec::new(),
        };
        let hits = catalog.search(&filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].code, "BM12_CRLIN12");

        let by_theme = CatalogFilter {
            themes: vec![1],
            ..CatalogFilter::default()
        };
        assert_eq!(catalog.search(&by_theme).len(), 1);
        assert!(catalog
            .search(&CatalogFilter {
                frequency: Some("Anual".into()),
                ..CatalogFilter::default()
            })
            .is_empty());
    }

    #[test]
    fn sources_and_themes_follow_frequency() {
        let catalog = loaded();
        assert_eq!(catalog.sources("Mensal"), vec!["BCB".to_string(), "IPEA".to_string()]);
        let names: Vec<_> = catalog.themes("Mensal").iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Renda", "Crédito"]);
    }

    #[test]
    fn staleness_tracks_refresh_time() {
        let mut catalog = SeriesCatalog::default();
        let now = Utc::now();
        assert!(catalog.is_stale(Duration::hours(1), now));
        catalog.replace(Vec::new(), Vec::new(), now - Duration::hours(2));
        assert!(catalog.is_stale(Duration::hours(1), now));
        assert!(!catalog.is_stale(Duration::hours(3), now));
    }
}
