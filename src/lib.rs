//! imgsync — reconciles image references stored in a relational catalog with
//! the binary assets they point to.
//!
//! Each asset is fetched from its current location (remote endpoint or local
//! path) with retry/backoff/timeout discipline, optionally re-hosted to S3,
//! and every catalog row referencing the old location is rewritten to the
//! new canonical URL. Per-asset failures are isolated into a failure ledger;
//! only configuration and catalog-connectivity errors abort a run.

#![warn(clippy::all)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod naming;
pub mod pipeline;
pub mod rehost;
pub mod report;
pub mod retry;
pub mod shutdown;

pub use catalog::{AssetRef, Catalog, CatalogError};
pub use fetch::{FetchEngine, FetchError, Fetched};
pub use pipeline::{PipelineConfig, RunSummary};
pub use rehost::{Rehost, RehostError};
pub use report::{PipelineEvent, Reporter};
