use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use serieswatch_config::{load_config, AppConfig, NotifierConfig, NotifierKind};
use serieswatch_core::{ReconciliationOutcome, Subscription, DATE_FORMAT};
use serieswatch_data::{CatalogFilter, CatalogPolicy, IpeaClient, RequestLimiter, SeriesCatalog};
use serieswatch_engine::{CallPolicy, ReconciliationEngine, RunDriver, RunSummary, ShutdownSignal};
use serieswatch_notify::{EmailApiConfig, EmailApiNotifier, LogNotifier, Notifier};
use serieswatch_store::SubscriptionStore;
use tracing::{info, warn};

use crate::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Economic series monitoring and alerting")]
pub struct Cli {
    /// Configuration layer to load from `config/{env}.toml`
    #[arg(long, global = true, default_value = "default")]
    env: String,
    /// Extra configuration file applied after the layered files
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increases logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile every subscription not yet checked on the reference date
    Run(RunArgs),
    /// Register a new subscription
    Subscribe(SubscribeArgs),
    /// Remove the subscriptions of an address to a series
    Unsubscribe(UnsubscribeArgs),
    /// Print stored subscriptions
    List(ListArgs),
    /// Search the provider catalog of monetary series
    Catalog(CatalogArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Reference date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Overrides `engine.concurrency`
    #[arg(long)]
    concurrency: Option<usize>,
    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct SubscribeArgs {
    #[arg(long)]
    series: String,
    #[arg(long)]
    address: String,
    /// Minimum absolute change, in percent, that triggers an alert
    #[arg(long, allow_hyphen_values = true)]
    threshold: String,
    /// Provider update date already seen by the subscriber (YYYY-MM-DD)
    #[arg(long)]
    known_update: Option<String>,
}

#[derive(Args)]
pub struct UnsubscribeArgs {
    #[arg(long)]
    series: String,
    #[arg(long)]
    address: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct CatalogArgs {
    /// Publication frequency, e.g. `Mensal`
    #[arg(long)]
    frequency: Option<String>,
    /// Source acronym; repeat to match any of several
    #[arg(long = "source")]
    sources: Vec<String>,
    /// Theme code; repeat to match any of several
    #[arg(long = "theme")]
    themes: Vec<i64>,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.env), cli.config.as_deref())?;
    let _guard = telemetry::init_tracing(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Run(args) => args.run(&config).await,
        Commands::Subscribe(args) => args.run(&config),
        Commands::Unsubscribe(args) => args.run(&config),
        Commands::List(args) => args.run(&config),
        Commands::Catalog(args) => args.run(&config).await,
    }
}

fn open_store(config: &AppConfig) -> Result<SubscriptionStore> {
    SubscriptionStore::open_sqlite(config.database.path.clone()).with_context(|| {
        format!(
            "failed to open subscription database {}",
            config.database.path.display()
        )
    })
}

fn ipea_client(config: &AppConfig) -> IpeaClient {
    IpeaClient::new(config.source.base_url.clone())
        .with_limiter(RequestLimiter::per_second(config.source.requests_per_second))
}

fn build_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Email => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow!("notifier.api_key is required for e-mail delivery"))?;
            let sender_email = config
                .sender_email
                .clone()
                .ok_or_else(|| anyhow!("notifier.sender_email is required for e-mail delivery"))?;
            Ok(Arc::new(EmailApiNotifier::new(EmailApiConfig {
                api_url: config.api_url.clone(),
                api_key,
                sender_name: config.sender_name.clone(),
                sender_email,
                dashboard_url: config.dashboard_url.clone(),
            })))
        }
    }
}

impl RunArgs {
    async fn run(self, config: &AppConfig) -> Result<()> {
        let store = open_store(config)?;
        let notifier = build_notifier(&config.notifier)?;
        let engine = ReconciliationEngine::new(Arc::new(ipea_client(config)), notifier, store)
            .with_fetch_policy(CallPolicy::new(
                config.source.timeout(),
                config.source.retries,
                config.source.retry_backoff(),
            ))
            .with_notify_policy(CallPolicy::new(
                config.notifier.timeout(),
                config.notifier.retries,
                config.notifier.retry_backoff(),
            ));

        let shutdown = ShutdownSignal::new();
        let driver = RunDriver::new(Arc::new(engine))
            .with_concurrency(self.concurrency.unwrap_or(config.engine.concurrency))
            .with_shutdown(shutdown.clone());

        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight subscriptions");
                shutdown.trigger();
            }
        });
        let result = driver.run_reconciliation(self.date).await;
        listener.abort();

        let summary = result.context("reconciliation run aborted")?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Run {} | eligible {} | dispatched {} | skipped {}",
        summary.reference_date, summary.eligible, summary.dispatched, summary.skipped
    );
    for outcome in ReconciliationOutcome::ALL {
        println!("  {:<20} {}", outcome.as_str(), summary.count(outcome));
    }
    for report in &summary.reports {
        if report.outcome != ReconciliationOutcome::Failed && report.checkpoint_errors.is_empty() {
            continue;
        }
        println!(
            "  ! {} {} {}: {}",
            report.subscription_id,
            report.series_code,
            report.outcome,
            report.diagnostic.as_deref().unwrap_or("checkpoint write failed")
        );
    }
}

impl SubscribeArgs {
    fn run(self, config: &AppConfig) -> Result<()> {
        let store = open_store(config)?;
        let created = store.create(
            &self.series,
            &self.address,
            &self.threshold,
            self.known_update.as_deref(),
        )?;
        info!(subscription_id = %created.id, "subscription stored");
        println!(
            "Subscribed {} to {} (threshold {}%, id {})",
            created.subscriber_address, created.series_code, created.threshold_margin, created.id
        );
        Ok(())
    }
}

impl UnsubscribeArgs {
    fn run(self, config: &AppConfig) -> Result<()> {
        let store = open_store(config)?;
        let removed = store.delete(&self.series, &self.address)?;
        for record in &removed {
            println!("Removed {} ({} -> {})", record.id, record.series_code, record.subscriber_address);
        }
        Ok(())
    }
}

impl ListArgs {
    fn run(self, config: &AppConfig) -> Result<()> {
        let store = open_store(config)?;
        let records = store.list()?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }
        if records.is_empty() {
            println!("No subscriptions stored.");
            return Ok(());
        }
        println!(
            "{:<36}  {:<20}  {:<28}  {:>9}  {:<10}  {:<10}  {:<10}",
            "ID", "SERIES", "ADDRESS", "THRESHOLD", "KNOWN", "CHECKED", "ALERTED"
        );
        for record in &records {
            print_row(record);
        }
        Ok(())
    }
}

fn print_row(record: &Subscription) {
    let date = |value: Option<NaiveDate>| {
        value
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    println!(
        "{:<36}  {:<20}  {:<28}  {:>9}  {:<10}  {:<10}  {:<10}",
        record.id.as_str(),
        record.series_code.as_str(),
        record.subscriber_address,
        record.threshold_margin.to_string(),
        date(record.last_known_update_date),
        date(record.last_checked_date),
        date(record.last_alert_date)
    );
}

impl CatalogArgs {
    async fn run(self, config: &AppConfig) -> Result<()> {
        let client = ipea_client(config);
        let mut catalog = SeriesCatalog::new(CatalogPolicy::default());
        catalog
            .refresh(&client)
            .await
            .context("failed to load the series catalog")?;

        let filter = CatalogFilter {
            frequency: self.frequency.clone(),
            sources: self.sources,
            themes: self.themes,
        };
        let hits = catalog.search(&filter);
        for entry in &hits {
            println!(
                "{:<24}  {:<8}  {:<12}  {:<14}  {}",
                entry.code, entry.source_acronym, entry.frequency, entry.unit, entry.name
            );
        }
        println!("{} of {} series matched", hits.len(), catalog.len());
        if let Some(frequency) = self.frequency.as_deref() {
            println!("Sources: {}", catalog.sources(frequency).join(", "));
            let themes: Vec<String> = catalog
                .themes(frequency)
                .iter()
                .map(|theme| format!("{} ({})", theme.name, theme.code))
                .collect();
            println!("Themes: {}", themes.join(", "));
        }
        Ok(())
    }
}
