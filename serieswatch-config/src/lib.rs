//! Layered configuration for the serieswatch runtime.
//!
//! Sources are merged in this order, later ones winning:
//! `config/default.toml`, `config/{env}.toml`, `config/local.toml`, an explicit file, and
//! finally `SERIESWATCH__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use serieswatch_data::IPEA_BASE_URL;

pub const ENV_PREFIX: &str = "SERIESWATCH";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub notifier: NotifierConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/serieswatch.db"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Extra attempts after a transient failure or timeout.
    pub retries: u32,
    pub retry_backoff_ms: u64,
    /// `0` disables throttling.
    pub requests_per_second: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: IPEA_BASE_URL.to_string(),
            timeout_secs: 30,
            retries: 1,
            retry_backoff_ms: 500,
            requests_per_second: 5,
        }
    }
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Log,
    Email,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub api_url: String,
    pub api_key: Option<String>,
    pub sender_name: String,
    pub sender_email: Option<String>,
    pub dashboard_url: Option<String>,
    pub timeout_secs: u64,
    /// Extra attempts after a timeout. Explicit delivery failures are never retried.
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Log,
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            api_key: None,
            sender_name: "Serieswatch".to_string(),
            sender_email: None,
            dashboard_url: None,
            timeout_secs: 20,
            retries: 0,
            retry_backoff_ms: 0,
        }
    }
}

impl NotifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            bail!("source.base_url must not be empty");
        }
        if self.engine.concurrency == 0 {
            bail!("engine.concurrency must be at least 1");
        }
        if self.notifier.kind == NotifierKind::Email {
            if self.notifier.api_key.as_deref().map_or(true, str::is_empty) {
                bail!("notifier.api_key is required when notifier.kind = \"email\"");
            }
            if self
                .notifier
                .sender_email
                .as_deref()
                .map_or(true, str::is_empty)
            {
                bail!("notifier.sender_email is required when notifier.kind = \"email\"");
            }
        }
        Ok(())
    }
}

/// Load configuration relative to the current working directory.
pub fn load_config(env: Option<&str>, explicit: Option<&Path>) -> Result<AppConfig> {
    load_config_from(Path::new("."), env, explicit)
}

/// Load configuration using `root/config` as the directory of layered files.
pub fn load_config_from(root: &Path, env: Option<&str>, explicit: Option<&Path>) -> Result<AppConfig> {
    let dir = root.join("config");
    let mut builder =
        Config::builder().add_source(File::from(dir.join("default.toml")).required(false));
    if let Some(env) = env {
        builder = builder.add_source(File::from(dir.join(format!("{env}.toml"))).required(false));
    }
    builder = builder.add_source(File::from(dir.join("local.toml")).required(false));
    if let Some(path) = explicit {
        builder = builder.add_source(File::from(path.to_path_buf()).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .context("failed to assemble configuration sources")?
        .try_deserialize::<AppConfig>()
        .context("failed to deserialize configuration")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_without_files() {
        let dir = tempdir().unwrap();
        let config = load_config_from(dir.path(), Some("default"), None).unwrap();
        assert_eq!(config.engine.concurrency, 4);
        assert_eq!(config.notifier.kind, NotifierKind::Log);
        assert_eq!(config.source.retries, 1);
        assert_eq!(config.source.timeout(), Duration::from_secs(30));
        assert_eq!(config.source.base_url, IPEA_BASE_URL);
        assert_eq!(config.notifier.retry_backoff(), Duration::ZERO);
    }

    #[test]
    fn notifier_backoff_is_independent_of_source_backoff() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("backoff.toml");
        let contents = toml::toml! {
            [source]
            retry_backoff_ms = 2000

            [notifier]
            retries = 2
            retry_backoff_ms = 250
        };
        fs::write(&explicit, contents.to_string()).unwrap();
        let config = load_config_from(dir.path(), None, Some(&explicit)).unwrap();
        assert_eq!(config.source.retry_backoff(), Duration::from_secs(2));
        assert_eq!(config.notifier.retry_backoff(), Duration::from_millis(250));

        fs::write(&explicit, "[source]\nretry_backoff_ms = 2000\n").unwrap();
        let config = load_config_from(dir.path(), None, Some(&explicit)).unwrap();
        assert_eq!(config.notifier.retry_backoff(), Duration::ZERO);
    }

    #[test]
    fn env_layer_overrides_default_layer() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(
            config_dir.join("default.toml"),
            "[engine]\nconcurrency = 2\n[database]\npath = \"a.db\"\n",
        )
        .unwrap();
        fs::write(config_dir.join("prod.toml"), "[engine]\nconcurrency = 8\n").unwrap();

        let config = load_config_from(dir.path(), Some("prod"), None).unwrap();
        assert_eq!(config.engine.concurrency, 8);
        assert_eq!(config.database.path, PathBuf::from("a.db"));
    }

    #[test]
    fn explicit_file_wins_and_must_exist() {
        let dir = tempdir().unwrap();
        let explicit = dir.path().join("custom.toml");
        let contents = toml::toml! {
            [source]
            timeout_secs = 5
            requests_per_second = 0
        };
        fs::write(&explicit, contents.to_string()).unwrap();
        let config = load_config_from(dir.path(), None, Some(&explicit)).unwrap();
        assert_eq!(config.source.timeout_secs, 5);
        assert_eq!(config.source.requests_per_second, 0);

        assert!(load_config_from(dir.path(), None, Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn email_notifier_requires_credentials() {
        let mut config = AppConfig::default();
        config.notifier.kind = NotifierKind::Email;
        assert!(config.validate().is_err());
        config.notifier.api_key = Some("key".into());
        config.notifier.sender_email = Some("alerts@example.com".into());
        assert!(config.validate().is_ok());
    }
}
