//! Bulk loader: processed snapshots → relational store, skipping existing keys
//!
//! Meant for seeding an empty store. Rows already present are left as they
//! are, so against a populated store it does not converge with the merger.

use crate::error::Result;
use crate::landing::LandingZone;
use crate::model::{EntityType, Record};
use crate::normalize::normalize_batch;
use crate::store::RelationalStore;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub files_read: usize,
    /// Unreadable files, or files that did not hold a JSON array
    pub files_skipped: usize,
    pub rejected: usize,
    pub loaded: u64,
}

pub struct BulkLoader<'a, S> {
    store: &'a S,
    processed: &'a LandingZone,
}

impl<'a, S: RelationalStore> BulkLoader<'a, S> {
    pub fn new(store: &'a S, processed: &'a LandingZone) -> Self {
        Self { store, processed }
    }

    /// Every snapshot file for the entity, sorted
    pub async fn snapshot_paths(&self, entity: EntityType) -> Result<Vec<PathBuf>> {
        self.processed.paths(entity).await
    }

    /// Insert rows from `paths`; all files go in one transaction
    #[instrument(skip(self, paths), fields(entity = %R::ENTITY, files = paths.len()))]
    pub async fn load<R: Record>(&self, paths: &[PathBuf]) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut records = Vec::new();

        for path in paths {
            match read_array(path).await {
                Some(items) => {
                    report.files_read += 1;
                    records.extend(items);
                },
                None => report.files_skipped += 1,
            }
        }

        let batch = normalize_batch::<R, _>(&records);
        report.rejected = batch.rejected;
        report.loaded = self.store.insert_rows_skip_conflicts(&batch.rows).await?;

        info!(
            entity = %R::ENTITY,
            files_read = report.files_read,
            files_skipped = report.files_skipped,
            loaded = report.loaded,
            skipped_rows = (batch.rows.len() as u64).saturating_sub(report.loaded),
            "Loaded snapshots"
        );
        Ok(report)
    }
}

async fn read_array(path: &Path) -> Option<Vec<Value>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read snapshot, skipping");
            return None;
        },
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Array(items)) => Some(items),
        Ok(_) => {
            warn!(path = %path.display(), "Snapshot is not a JSON array, skipping");
            None
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot parse snapshot, skipping");
            None
        },
    }
}
