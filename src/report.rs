//! Run reporting — the pipeline emits one structured event per asset-stage
//! transition and stays ignorant of presentation; the console reporter turns
//! events into tracing lines and a progress bar.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};

/// One asset-stage transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    RunStarted {
        total_assets: usize,
    },
    /// Destination file already exists non-empty; no network call made.
    Skipped {
        asset_id: String,
        filename: String,
    },
    Fetched {
        asset_id: String,
        filename: String,
        byte_count: u64,
    },
    FetchFailed {
        asset_id: String,
        source_location: String,
        reason: String,
    },
    Uploaded {
        asset_id: String,
        url: String,
    },
    UploadFailed {
        asset_id: String,
        reason: String,
    },
    Reconciled {
        asset_id: String,
        rows: u64,
    },
    /// The update matched zero rows; non-fatal.
    ReconcileWarning {
        asset_id: String,
        source_location: String,
    },
    /// Terminal success state for one asset.
    Done {
        asset_id: String,
    },
}

/// Consumer of the pipeline's event stream.
pub trait Reporter: Send + Sync {
    fn event(&self, event: &PipelineEvent);
}

/// Reporter that drops every event; used by dry runs and tests.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn event(&self, _event: &PipelineEvent) {}
}

/// Console reporter: tracing lines plus an indicatif bar. Hidden when stdout
/// is not a TTY (piped output, cron) or when the user asked for no bar.
pub struct ConsoleReporter {
    bar: ProgressBar,
}

impl ConsoleReporter {
    pub fn new(no_progress_bar: bool) -> Self {
        let bar = if no_progress_bar || !std::io::stdout().is_terminal() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )
                .expect("valid template")
                .progress_chars("=> "),
            );
            bar
        };
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Reporter for ConsoleReporter {
    fn event(&self, event: &PipelineEvent) {
        // `suspend` coordinates log writes with the bar redraw so output
        // doesn't garble.
        match event {
            PipelineEvent::RunStarted { total_assets } => {
                self.bar.set_length(*total_assets as u64);
                self.bar
                    .suspend(|| tracing::info!("Processing {} assets", total_assets));
            }
            PipelineEvent::Skipped { asset_id, filename } => {
                self.bar.suspend(|| {
                    tracing::debug!(%asset_id, "Already present: {}", filename);
                });
            }
            PipelineEvent::Fetched {
                asset_id,
                filename,
                byte_count,
            } => {
                self.bar.set_message(filename.clone());
                self.bar.suspend(|| {
                    tracing::debug!(%asset_id, bytes = byte_count, "Fetched {}", filename);
                });
            }
            PipelineEvent::FetchFailed {
                asset_id,
                source_location,
                reason,
            } => {
                self.bar.suspend(|| {
                    tracing::error!(%asset_id, "Fetch failed for {}: {}", source_location, reason);
                });
                self.bar.inc(1);
            }
            PipelineEvent::Uploaded { asset_id, url } => {
                self.bar
                    .suspend(|| tracing::debug!(%asset_id, "Rehosted to {}", url));
            }
            PipelineEvent::UploadFailed { asset_id, reason } => {
                self.bar
                    .suspend(|| tracing::error!(%asset_id, "Upload failed: {}", reason));
                self.bar.inc(1);
            }
            PipelineEvent::Reconciled { asset_id, rows } => {
                self.bar
                    .suspend(|| tracing::debug!(%asset_id, rows, "Catalog reconciled"));
            }
            PipelineEvent::ReconcileWarning {
                asset_id,
                source_location,
            } => {
                self.bar.suspend(|| {
                    tracing::warn!(
                        %asset_id,
                        "No catalog rows matched location '{}'",
                        source_location
                    );
                });
            }
            PipelineEvent::Done { .. } => {
                self.bar.inc(1);
            }
        }
    }
}
