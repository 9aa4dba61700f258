//! End-to-end pipeline runs against a loopback server: the shared-location
//! fan-out scenario, idempotent re-runs, collision naming and the failure
//! ledger.

mod common;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use imgsync::pipeline::{self, PipelineConfig};
use imgsync::rehost::RehostError;
use imgsync::report::{NullReporter, PipelineEvent, Reporter};
use imgsync::retry::RetryConfig;
use imgsync::{AssetRef, Catalog, CatalogError, FetchEngine, Rehost};

use common::{png_bytes, TestServer};

/// In-memory stand-in for the MySQL catalog: rows of (id, name, location).
struct FakeCatalog {
    rows: Mutex<Vec<(String, String, String)>>,
    distinct: bool,
}

impl FakeCatalog {
    fn new(rows: &[(&str, &str, &str)], distinct: bool) -> Self {
        Self {
            rows: Mutex::new(
                rows.iter()
                    .map(|(a, b, c)| (a.to_string(), b.to_string(), c.to_string()))
                    .collect(),
            ),
            distinct,
        }
    }

    fn locations(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|r| r.2.clone()).collect()
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn list_assets(&self) -> Result<Vec<AssetRef>, CatalogError> {
        let rows = self.rows.lock().unwrap();
        let mut seen = std::collections::HashSet::new();
        Ok(rows
            .iter()
            .filter(|(_, _, loc)| !loc.is_empty())
            .filter(|(_, _, loc)| !self.distinct || seen.insert(loc.clone()))
            .map(|(id, name, loc)| AssetRef {
                id: id.clone(),
                display_name: name.clone(),
                source_location: loc.clone(),
                base_url: None,
            })
            .collect())
    }

    async fn update_location(&self, old: &str, new: &str) -> u64 {
        let mut rows = self.rows.lock().unwrap();
        let mut count = 0;
        for row in rows.iter_mut() {
            if row.2 == old {
                row.2 = new.to_string();
                count += 1;
            }
        }
        count
    }
}

/// Mints deterministic public URLs without touching any object store.
struct FakeRehost;

#[async_trait]
impl Rehost for FakeRehost {
    async fn upload(&self, _local_path: &Path, filename: &str) -> Result<String, RehostError> {
        Ok(format!("https://b.s3.us-east-1.amazonaws.com/{filename}"))
    }
}

/// Records every event for order assertions.
#[derive(Default)]
struct CollectingReporter {
    events: Mutex<Vec<PipelineEvent>>,
}

impl Reporter for CollectingReporter {
    fn event(&self, event: &PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn engine() -> FetchEngine {
    FetchEngine::with_client(
        reqwest::Client::new(),
        RetryConfig {
            max_retries: 0,
            base_delay_secs: 0,
            max_delay_secs: 0,
        },
    )
}

fn config(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        directory: dir.to_path_buf(),
        ledger_path: dir.join("failed_assets.txt"),
        concurrency: 1,
        inter_asset_delay: Duration::ZERO,
        dry_run: false,
    }
}

fn image_router() -> Router {
    Router::new()
        .route(
            "/a.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], png_bytes()) }),
        )
        .route(
            "/media/a.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], png_bytes()) }),
        )
        .route(
            "/b.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], png_bytes()) }),
        )
        .route("/gone.png", get(|| async { StatusCode::NOT_FOUND }))
}

#[tokio::test]
async fn shared_location_fetches_once_and_rewrites_every_row() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let url = server.url("/a.png");

    let catalog = FakeCatalog::new(&[("1", "Widget", &url), ("2", "Widget 2", &url)], true);
    let summary = pipeline::run(
        &catalog,
        &engine(),
        Some(&FakeRehost),
        &NullReporter,
        &config(dir.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_assets, 1);
    assert_eq!(summary.successful_downloads, 1);
    assert_eq!(summary.successful_uploads, 1);
    assert_eq!(summary.database_updates, 2);
    assert_eq!(server.hits("/a.png"), 1);

    let locations = catalog.locations();
    assert_eq!(locations[0], "https://b.s3.us-east-1.amazonaws.com/a.png");
    assert_eq!(locations[0], locations[1]);
    assert_eq!(
        std::fs::read(dir.path().join("a.png")).unwrap(),
        png_bytes()
    );
}

#[tokio::test]
async fn second_run_skips_existing_files_with_no_requests() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let a = server.url("/a.png");
    let b = server.url("/b.png");

    let catalog = FakeCatalog::new(&[("1", "A", &a), ("2", "B", &b)], false);
    let cfg = config(dir.path());

    let first = pipeline::run(
        &catalog,
        &engine(),
        None,
        &NullReporter,
        &cfg,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(first.successful_downloads, 2);
    let hits_after_first = server.total_hits();

    let second = pipeline::run(
        &catalog,
        &engine(),
        None,
        &NullReporter,
        &cfg,
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(second.skipped_existing, 2);
    assert_eq!(second.successful_downloads, 0);
    assert_eq!(server.total_hits(), hits_after_first);
}

#[tokio::test]
async fn colliding_basenames_get_suffixed_filenames() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();
    // Different locations, same final path segment.
    let first = server.url("/a.png");
    let second = server.url("/media/a.png");

    let catalog = FakeCatalog::new(&[("1", "A", &first), ("2", "B", &second)], false);
    let summary = pipeline::run(
        &catalog,
        &engine(),
        None,
        &NullReporter,
        &config(dir.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.successful_downloads, 2);
    let a = std::fs::metadata(dir.path().join("a.png")).unwrap();
    let a1 = std::fs::metadata(dir.path().join("a_1.png")).unwrap();
    assert!(a.len() > 0);
    assert!(a1.len() > 0);
}

#[tokio::test]
async fn failed_asset_lands_in_the_ledger_and_run_continues() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let gone = server.url("/gone.png");
    let ok = server.url("/a.png");

    let catalog = FakeCatalog::new(&[("1", "Gone", &gone), ("2", "Ok", &ok)], false);
    let cfg = config(dir.path());
    let summary = pipeline::run(
        &catalog,
        &engine(),
        Some(&FakeRehost),
        &NullReporter,
        &cfg,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.failed_downloads, 1);
    assert_eq!(summary.successful_downloads, 1);
    assert_eq!(summary.successful_uploads, 1);
    assert_eq!(summary.failure_records, 1);
    // Terminal 404: one attempt, no retry.
    assert_eq!(server.hits("/gone.png"), 1);

    let ledger = std::fs::read_to_string(&cfg.ledger_path).unwrap();
    let mut fields = ledger.lines().next().unwrap().split('\t');
    assert_eq!(fields.next(), Some("1"));
    assert_eq!(fields.next(), Some("Gone"));
    assert_eq!(fields.next(), Some(gone.as_str()));
    assert!(fields.next().unwrap().contains("404"));
}

#[tokio::test]
async fn every_row_sharing_a_location_is_rewritten() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let url = server.url("/b.png");

    let catalog = FakeCatalog::new(
        &[("1", "P1", &url), ("2", "P2", &url), ("3", "P3", &url)],
        true,
    );
    let summary = pipeline::run(
        &catalog,
        &engine(),
        Some(&FakeRehost),
        &NullReporter,
        &config(dir.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.database_updates, 3);
    assert_eq!(summary.reconcile_warnings, 0);
    assert!(catalog
        .locations()
        .iter()
        .all(|l| l == "https://b.s3.us-east-1.amazonaws.com/b.png"));
}

#[tokio::test]
async fn events_arrive_in_stage_order_per_asset() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();
    let url = server.url("/a.png");

    let catalog = FakeCatalog::new(&[("1", "A", &url)], false);
    let reporter = CollectingReporter::default();
    pipeline::run(
        &catalog,
        &engine(),
        Some(&FakeRehost),
        &reporter,
        &config(dir.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let events = reporter.events.lock().unwrap();
    assert!(matches!(
        events[0],
        PipelineEvent::RunStarted { total_assets: 1 }
    ));
    assert!(matches!(events[1], PipelineEvent::Fetched { .. }));
    assert!(matches!(events[2], PipelineEvent::Uploaded { .. }));
    assert!(matches!(events[3], PipelineEvent::Reconciled { rows: 1, .. }));
    assert!(matches!(events[4], PipelineEvent::Done { .. }));
    assert_eq!(events.len(), 5);
}

#[tokio::test]
async fn base_url_applies_to_relative_locations() {
    let server = TestServer::start(image_router()).await;
    let dir = tempfile::tempdir().unwrap();

    // Catalog rows carry bare filenames; the base URL supplies the host.
    struct RelativeCatalog {
        base: String,
    }

    #[async_trait]
    impl Catalog for RelativeCatalog {
        async fn list_assets(&self) -> Result<Vec<AssetRef>, CatalogError> {
            Ok(vec![AssetRef {
                id: "1".to_string(),
                display_name: "A".to_string(),
                source_location: "a.png".to_string(),
                base_url: Some(self.base.clone()),
            }])
        }

        async fn update_location(&self, _old: &str, _new: &str) -> u64 {
            0
        }
    }

    let catalog = RelativeCatalog {
        base: server.url("/media/"),
    };
    let summary = pipeline::run(
        &catalog,
        &engine(),
        None,
        &NullReporter,
        &config(dir.path()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.successful_downloads, 1);
    assert_eq!(server.hits("/media/a.png"), 1);
}
