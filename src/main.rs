//! imgsync binary — wires configuration, the MySQL catalog, the fetch
//! engine and the optional S3 rehoster into the pipeline, then reports a
//! per-stage summary.

use anyhow::Context;
use aws_credential_types::provider::ProvideCredentials;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use imgsync::catalog::MySqlCatalog;
use imgsync::cli::{Cli, LogLevel};
use imgsync::config::Config;
use imgsync::pipeline::{self, PipelineConfig, RunSummary};
use imgsync::rehost::{Rehost, S3Rehoster};
use imgsync::report::ConsoleReporter;
use imgsync::{shutdown, FetchEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = Config::from_cli(cli)?;
    tracing::info!(
        concurrency = config.concurrency,
        directory = %config.directory.display(),
        "Starting imgsync"
    );

    // Storage credentials are required configuration once rehosting is
    // requested; resolve them before any catalog or network I/O.
    if config.rehost.is_some() && !config.dry_run {
        let sdk_config = aws_config::from_env().load().await;
        let provider = sdk_config
            .credentials_provider()
            .context("rehosting requested but no AWS credentials provider is configured")?;
        provider
            .provide_credentials()
            .await
            .context("rehosting requested but AWS credentials could not be resolved")?;
    }

    // Catalog connectivity is fatal; the run cannot proceed without its
    // snapshot of asset records.
    let catalog = MySqlCatalog::connect(
        &config.dsn,
        config.schema.clone(),
        config.distinct,
        config.base_url.clone(),
    )
    .await
    .context("cannot open the catalog")?;

    // An unreachable object store only disables the rehost stage; the run
    // degrades to download-only.
    let rehoster: Option<S3Rehoster> = match (&config.rehost, config.dry_run) {
        (Some(target), false) => match S3Rehoster::connect(target.clone()).await {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::warn!("{}; continuing without the rehost stage", e);
                None
            }
        },
        _ => None,
    };

    let fetcher = FetchEngine::new(config.connect_timeout, config.read_timeout, config.retry)?;

    let pipeline_config = PipelineConfig {
        directory: config.directory.clone(),
        ledger_path: config.ledger_path.clone(),
        concurrency: config.concurrency,
        inter_asset_delay: config.inter_asset_delay,
        dry_run: config.dry_run,
    };

    let shutdown_token = shutdown::install_signal_handler();
    let reporter = ConsoleReporter::new(config.no_progress_bar);

    let summary = pipeline::run(
        &catalog,
        &fetcher,
        rehoster.as_ref().map(|r| r as &dyn Rehost),
        &reporter,
        &pipeline_config,
        shutdown_token,
    )
    .await?;
    reporter.finish();

    log_summary(&summary, &config);

    // Per-asset failures never abort the run; only configuration and
    // catalog-connectivity errors exit non-zero (via `?` above).
    Ok(())
}

fn log_summary(summary: &RunSummary, config: &Config) {
    tracing::info!("── Summary ──");
    tracing::info!("  assets:            {}", summary.total_assets);
    tracing::info!("  already present:   {}", summary.skipped_existing);
    tracing::info!(
        "  downloaded:        {} ({} failed)",
        summary.successful_downloads,
        summary.failed_downloads
    );
    if config.rehost.is_some() {
        tracing::info!(
            "  uploaded:          {} ({} failed)",
            summary.successful_uploads,
            summary.failed_uploads
        );
        tracing::info!(
            "  catalog rows:      {} updated, {} locations unmatched",
            summary.database_updates,
            summary.reconcile_warnings
        );
    }
    tracing::info!("  destination:       {}", config.directory.display());
    if summary.failure_records > 0 {
        tracing::info!("  failure ledger:    {}", config.ledger_path.display());
    }
}
