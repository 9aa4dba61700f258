//! Orchestrator — drives each asset through fetch, optional rehost and
//! catalog reconcile, isolating per-asset failures so one bad asset never
//! aborts the run.
//!
//! Fetches run concurrently over a bounded pool; the claim-set is filled in a
//! single-owner pre-pass and catalog writes happen only in the consuming
//! loop, so both stay serialized regardless of fetch concurrency.

pub mod ledger;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::catalog::{AssetRef, Catalog};
use crate::fetch::{FetchEngine, Fetched};
use crate::naming::{self, NamingState};
use crate::rehost::Rehost;
use crate::report::{PipelineEvent, Reporter};
use ledger::{FailureLedger, FailureRecord};

/// Orchestration settings for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Destination directory for fetched files.
    pub directory: PathBuf,
    /// Where to persist the failure ledger at run end.
    pub ledger_path: PathBuf,
    /// Bounded fetch pool size; 1 is the strictly sequential baseline.
    pub concurrency: usize,
    /// Pause before admitting each fetch, throttling the source host.
    pub inter_asset_delay: Duration,
    /// Report what would be fetched without any network or catalog writes.
    pub dry_run: bool,
}

/// Per-stage counters for the final summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub total_assets: usize,
    pub skipped_existing: usize,
    pub successful_downloads: usize,
    pub failed_downloads: usize,
    pub successful_uploads: usize,
    pub failed_uploads: usize,
    /// Catalog rows rewritten across all reconciles.
    pub database_updates: u64,
    /// Reconciles that matched zero rows.
    pub reconcile_warnings: usize,
    pub failure_records: usize,
}

/// A pending asset with its claimed destination name.
struct Work {
    asset: AssetRef,
    filename: String,
    dest: PathBuf,
}

/// Run the pipeline over a snapshot of the catalog.
///
/// The asset list is captured once up front; the catalog is only touched
/// again for reconcile writes. Catalog list failures are fatal and propagate;
/// everything after that is per-asset and recorded instead of raised.
pub async fn run(
    catalog: &dyn Catalog,
    fetcher: &FetchEngine,
    rehoster: Option<&dyn Rehost>,
    reporter: &dyn Reporter,
    config: &PipelineConfig,
    shutdown: CancellationToken,
) -> Result<RunSummary> {
    let assets = catalog.list_assets().await?;

    let mut summary = RunSummary {
        total_assets: assets.len(),
        ..RunSummary::default()
    };
    reporter.event(&PipelineEvent::RunStarted {
        total_assets: assets.len(),
    });
    if assets.is_empty() {
        return Ok(summary);
    }

    if !config.dry_run {
        tokio::fs::create_dir_all(&config.directory).await?;
    }

    // Single-owner naming pass: claims are made here, sequentially, before
    // any fetch starts. Assets whose file already exists non-empty go
    // straight to Done with no network call.
    let mut state = NamingState::new();
    let mut pending: Vec<Work> = Vec::new();
    for asset in assets {
        let resolved = naming::resolve(&asset, &config.directory, &mut state);
        let dest = config.directory.join(&resolved.filename);
        if resolved.already_present {
            summary.skipped_existing += 1;
            reporter.event(&PipelineEvent::Skipped {
                asset_id: asset.id.clone(),
                filename: resolved.filename,
            });
            reporter.event(&PipelineEvent::Done { asset_id: asset.id });
        } else {
            pending.push(Work {
                asset,
                filename: resolved.filename,
                dest,
            });
        }
    }

    if config.dry_run {
        for work in &pending {
            tracing::info!(
                "[DRY RUN] Would fetch {} -> {}",
                work.asset.source_location,
                work.dest.display()
            );
        }
        return Ok(summary);
    }

    let mut failures = FailureLedger::new();

    let delay = config.inter_asset_delay;
    let admission_token = shutdown.clone();
    let fetch_stream = stream::iter(pending)
        .then(move |work| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            work
        })
        .take_while(move |_| std::future::ready(!admission_token.is_cancelled()))
        .map(|work| {
            let engine = fetcher.clone();
            async move {
                let result = engine
                    .fetch(
                        &work.asset.source_location,
                        work.asset.base_url.as_deref(),
                        &work.dest,
                    )
                    .await;
                (work, result)
            }
        })
        .buffer_unordered(config.concurrency.max(1));

    tokio::pin!(fetch_stream);

    // Consuming loop: uploads and catalog writes are serialized here.
    while let Some((work, result)) = fetch_stream.next().await {
        let fetched: Fetched = match result {
            Ok(f) => f,
            Err(e) => {
                summary.failed_downloads += 1;
                let reason = e.to_string();
                reporter.event(&PipelineEvent::FetchFailed {
                    asset_id: work.asset.id.clone(),
                    source_location: work.asset.source_location.clone(),
                    reason: reason.clone(),
                });
                failures.record(FailureRecord {
                    asset_id: work.asset.id,
                    display_name: work.asset.display_name,
                    source_location: work.asset.source_location,
                    reason,
                });
                continue;
            }
        };
        summary.successful_downloads += 1;
        reporter.event(&PipelineEvent::Fetched {
            asset_id: work.asset.id.clone(),
            filename: work.filename.clone(),
            byte_count: fetched.byte_count,
        });

        let Some(rehoster) = rehoster else {
            reporter.event(&PipelineEvent::Done {
                asset_id: work.asset.id,
            });
            continue;
        };

        let url = match rehoster.upload(&fetched.local_path, &work.filename).await {
            Ok(url) => url,
            Err(e) => {
                summary.failed_uploads += 1;
                let reason = e.to_string();
                reporter.event(&PipelineEvent::UploadFailed {
                    asset_id: work.asset.id.clone(),
                    reason: reason.clone(),
                });
                failures.record(FailureRecord {
                    asset_id: work.asset.id,
                    display_name: work.asset.display_name,
                    source_location: work.asset.source_location,
                    reason,
                });
                continue;
            }
        };
        summary.successful_uploads += 1;
        reporter.event(&PipelineEvent::Uploaded {
            asset_id: work.asset.id.clone(),
            url: url.clone(),
        });

        // Fan-out: one update rewrites every row sharing this location.
        let rows = catalog
            .update_location(&work.asset.source_location, &url)
            .await;
        if rows == 0 {
            summary.reconcile_warnings += 1;
            reporter.event(&PipelineEvent::ReconcileWarning {
                asset_id: work.asset.id.clone(),
                source_location: work.asset.source_location.clone(),
            });
        } else {
            summary.database_updates += rows;
            reporter.event(&PipelineEvent::Reconciled {
                asset_id: work.asset.id.clone(),
                rows,
            });
        }
        reporter.event(&PipelineEvent::Done {
            asset_id: work.asset.id,
        });
    }

    summary.failure_records = failures.len();
    if !failures.is_empty() {
        if let Err(e) = failures.write_to(&config.ledger_path) {
            tracing::error!(
                "Could not write failure ledger to {}: {}",
                config.ledger_path.display(),
                e
            );
        } else {
            tracing::info!(
                "{} failed assets recorded in {}",
                failures.len(),
                config.ledger_path.display()
            );
        }
    }

    Ok(summary)
}
