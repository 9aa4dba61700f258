//! Failure ledger — append-only record of every asset that failed to
//! complete the pipeline, persisted as a plain-text file at run end for
//! manual follow-up.

use std::path::Path;

/// One failed asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub asset_id: String,
    pub display_name: String,
    pub source_location: String,
    pub reason: String,
}

/// Append-only collection of failure records for one run.
#[derive(Debug, Default)]
pub struct FailureLedger {
    records: Vec<FailureRecord>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: FailureRecord) {
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[FailureRecord] {
        &self.records
    }

    /// Persist as tab-separated lines: id, display name, source location,
    /// reason. Tabs inside fields are flattened to spaces to keep the file
    /// splittable.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut out = String::new();
        for r in &self.records {
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\n",
                flatten(&r.asset_id),
                flatten(&r.display_name),
                flatten(&r.source_location),
                flatten(&r.reason)
            ));
        }
        std::fs::write(path, out)
    }
}

fn flatten(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}
