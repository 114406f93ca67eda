//! In-process relational store used by tests and dry runs

use super::RelationalStore;
use crate::error::{Result, SyncError};
use crate::model::{EntityType, Record};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

type Table<R> = BTreeMap<<R as Record>::Key, R>;

/// One key-ordered table per entity type
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<EntityType, Box<dyn Any + Send + Sync>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call fail, as during a database outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn count(&self, entity: EntityType) -> usize {
        match entity {
            EntityType::Meetings => self.len::<crate::model::Meeting>().await,
            EntityType::Drivers => self.len::<crate::model::Driver>().await,
            EntityType::Sessions => self.len::<crate::model::Session>().await,
            EntityType::SessionResults => self.len::<crate::model::SessionResult>().await,
            EntityType::StartingGrids => self.len::<crate::model::StartingGridEntry>().await,
        }
    }

    async fn len<R: Record>(&self) -> usize {
        let tables = self.tables.lock().await;
        tables
            .get(&R::ENTITY)
            .and_then(|t| t.downcast_ref::<Table<R>>())
            .map_or(0, |t| t.len())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::Storage("relational store is unavailable".to_string()));
        }
        Ok(())
    }

    /// Apply `write` to each row against the entity's table; returns rows it accepted
    async fn apply<R, F>(&self, rows: &[R], mut write: F) -> Result<u64>
    where
        R: Record,
        F: FnMut(&mut Table<R>, R) -> bool + Send,
    {
        self.check_available()?;
        let mut tables = self.tables.lock().await;
        let table = tables
            .entry(R::ENTITY)
            .or_insert_with(|| Box::new(Table::<R>::new()) as Box<dyn Any + Send + Sync>)
            .downcast_mut::<Table<R>>()
            .ok_or_else(|| SyncError::Storage(format!("table {} holds another row type", R::ENTITY)))?;

        let mut written = 0;
        for row in rows {
            if write(table, row.clone()) {
                written += 1;
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn upsert_rows<R: Record>(&self, rows: &[R]) -> Result<u64> {
        self.apply(rows, |table, row| {
            table.insert(row.key(), row);
            true
        })
        .await
    }

    async fn insert_rows_skip_conflicts<R: Record>(&self, rows: &[R]) -> Result<u64> {
        self.apply(rows, |table, row| match table.entry(row.key()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(row);
                true
            },
            std::collections::btree_map::Entry::Occupied(_) => false,
        })
        .await
    }

    async fn fetch_all<R: Record>(&self) -> Result<Vec<R>> {
        self.check_available()?;
        let tables = self.tables.lock().await;
        Ok(tables
            .get(&R::ENTITY)
            .and_then(|t| t.downcast_ref::<Table<R>>())
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::Meeting;

    fn meeting(key: i64, name: &str) -> Meeting {
        Meeting {
            meeting_key: key,
            circuit_key: None,
            circuit_short_name: None,
            meeting_code: None,
            location: None,
            country_key: None,
            country_code: None,
            country_name: None,
            meeting_name: Some(name.to_string()),
            meeting_official_name: None,
            gmt_offset: None,
            date_start: None,
            year: Some(2025),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_fetch_orders_by_key() {
        let store = MemoryStore::new();
        store.upsert_rows(&[meeting(2, "b"), meeting(1, "a")]).await.unwrap();
        store.upsert_rows(&[meeting(2, "b2")]).await.unwrap();

        let rows: Vec<Meeting> = store.fetch_all().await.unwrap();
        assert_eq!(rows, vec![meeting(1, "a"), meeting(2, "b2")]);
        assert_eq!(store.count(EntityType::Meetings).await, 2);
        assert_eq!(store.count(EntityType::Sessions).await, 0);
    }

    #[tokio::test]
    async fn test_skip_conflicts_keeps_existing_rows() {
        let store = MemoryStore::new();
        store.upsert_rows(&[meeting(1, "original")]).await.unwrap();

        let inserted = store
            .insert_rows_skip_conflicts(&[meeting(1, "ignored"), meeting(3, "new")])
            .await
            .unwrap();

        assert_eq!(inserted, 1);
        let rows: Vec<Meeting> = store.fetch_all().await.unwrap();
        assert_eq!(rows, vec![meeting(1, "original"), meeting(3, "new")]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.upsert_rows(&[meeting(1, "a")]).await.is_err());
    }
}
