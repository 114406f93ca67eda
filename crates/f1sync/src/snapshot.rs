//! Canonical processed snapshots: one JSON array per table, regenerated wholesale

use crate::error::Result;
use crate::landing::{LandingKey, LandingReceipt, LandingZone};
use crate::model::Record;
use crate::store::RelationalStore;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub rows: usize,
    pub receipt: LandingReceipt,
}

pub struct SnapshotExporter<'a, S> {
    store: &'a S,
    processed: &'a LandingZone,
}

impl<'a, S: RelationalStore> SnapshotExporter<'a, S> {
    pub fn new(store: &'a S, processed: &'a LandingZone) -> Self {
        Self { store, processed }
    }

    /// Serialize every row of `R`'s table, sorted by key, replacing the previous snapshot
    #[instrument(skip(self), fields(entity = %R::ENTITY))]
    pub async fn export<R: Record>(&self) -> Result<Snapshot> {
        let mut rows: Vec<R> = self.store.fetch_all().await?;
        rows.sort_by_key(|row| row.key());

        let receipt = self
            .processed
            .store(&LandingKey::snapshot(R::ENTITY), &rows)
            .await?;

        info!(
            entity = %R::ENTITY,
            rows = rows.len(),
            path = %receipt.local_path.display(),
            uploaded = receipt.mirrored,
            "Exported snapshot"
        );
        Ok(Snapshot {
            rows: rows.len(),
            receipt,
        })
    }
}
