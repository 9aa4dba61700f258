use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;

use crate::catalog::{CatalogDsn, CatalogSchema};
use crate::cli::{Cli, LogLevel};
use crate::rehost::RehostTarget;
use crate::retry::RetryConfig;

/// Application configuration, decoupled from CLI parsing so the pipeline can
/// be driven without clap. All pre-flight validation happens in `from_cli`,
/// before any I/O.
#[derive(Debug)]
pub struct Config {
    pub dsn: CatalogDsn,
    pub schema: CatalogSchema,
    pub directory: PathBuf,
    pub ledger_path: PathBuf,
    pub base_url: Option<String>,
    pub rehost: Option<RehostTarget>,
    pub retry: RetryConfig,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub inter_asset_delay: Duration,
    pub concurrency: usize,
    pub distinct: bool,
    pub dry_run: bool,
    pub no_progress_bar: bool,
    pub log_level: LogLevel,
}

impl Config {
    pub fn from_cli(cli: Cli) -> anyhow::Result<Self> {
        let raw_dsn = cli
            .database_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("DATABASE_URL is not set (or pass --database-url)")
            })?;
        let dsn = CatalogDsn::parse(raw_dsn)?;

        if cli.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }

        let directory = destination_directory(&cli.directory, cli.timestamp_suffix);
        let ledger_path = directory.join(&cli.ledger);

        let rehost = match cli.bucket {
            Some(bucket) if !bucket.is_empty() => Some(RehostTarget {
                bucket,
                key_prefix: cli.key_prefix,
                region: cli.region,
            }),
            _ => None,
        };

        Ok(Self {
            dsn,
            schema: CatalogSchema {
                table: cli.table,
                id_column: cli.id_column,
                name_column: cli.name_column,
                location_column: cli.location_column,
            },
            directory,
            ledger_path,
            base_url: cli.base_url,
            rehost,
            retry: RetryConfig {
                max_retries: cli.max_retries,
                base_delay_secs: cli.retry_delay,
                max_delay_secs: 30,
            },
            connect_timeout: Duration::from_secs(cli.connect_timeout),
            read_timeout: Duration::from_secs(cli.read_timeout),
            inter_asset_delay: Duration::from_millis(cli.inter_asset_delay_ms),
            concurrency: cli.concurrency,
            distinct: cli.distinct,
            dry_run: cli.dry_run,
            no_progress_bar: cli.no_progress_bar,
            log_level: cli.log_level,
        })
    }
}

/// Destination directory, optionally suffixed with the run's local timestamp
/// so repeated runs never collide.
fn destination_directory(directory: &str, timestamp_suffix: bool) -> PathBuf {
    if timestamp_suffix {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        PathBuf::from(format!("{directory}_{stamp}"))
    } else {
        PathBuf::from(directory)
    }
}
