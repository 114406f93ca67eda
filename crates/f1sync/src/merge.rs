//! Upsert engine: keyed insert-or-overwrite into the relational store

use crate::error::Result;
use crate::model::Record;
use crate::store::RelationalStore;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub received: usize,
    /// Rows dropped because a later row in the same batch had the same key
    pub collapsed: usize,
    pub applied: u64,
}

pub struct Merger<'a, S> {
    store: &'a S,
}

impl<'a, S: RelationalStore> Merger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Upsert `rows`; on key collision every non-key column is overwritten
    #[instrument(skip(self, rows), fields(entity = %R::ENTITY, rows = rows.len()))]
    pub async fn merge<R: Record>(&self, rows: Vec<R>) -> Result<MergeReport> {
        let received = rows.len();
        let unique = collapse_by_key(rows);
        let collapsed = received - unique.len();

        let applied = self.store.upsert_rows(&unique).await?;

        info!(entity = %R::ENTITY, received, collapsed, applied, "Merged rows");
        Ok(MergeReport {
            received,
            collapsed,
            applied,
        })
    }
}

/// One row per key, the last occurrence winning, ordered by key
pub fn collapse_by_key<R: Record>(rows: Vec<R>) -> Vec<R> {
    let mut by_key = BTreeMap::new();
    for row in rows {
        by_key.insert(row.key(), row);
    }
    by_key.into_values().collect()
}
