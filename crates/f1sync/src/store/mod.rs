//! Relational store for normalized rows
//!
//! Two write modes share one seam: upsert (overwrite every non-key column on
//! key collision) for the merger, and insert-skipping-conflicts for the bulk
//! loader. Callers pass rows with distinct keys.

use crate::error::Result;
use crate::model::Record;
use async_trait::async_trait;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PgStore, DEFAULT_BATCH_SIZE};

#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Insert-or-update in one transaction; returns rows written
    async fn upsert_rows<R: Record>(&self, rows: &[R]) -> Result<u64>;

    /// Insert in one transaction, leaving existing keys untouched; returns rows inserted
    async fn insert_rows_skip_conflicts<R: Record>(&self, rows: &[R]) -> Result<u64>;

    /// Every row of the entity's table, ordered by key
    async fn fetch_all<R: Record>(&self) -> Result<Vec<R>>;
}
