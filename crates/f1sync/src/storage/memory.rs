//! In-process object store used by tests and dry runs

use super::ObjectStore;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Make every later call fail, as during a store outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::Storage(format!("bucket {} is unavailable", self.bucket)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        self.check_available()?;
        self.objects.lock().await.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.check_available()?;
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::Storage(format!("no such key: {}", key)))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_replaces_and_list_filters_by_prefix() {
        let store = MemoryObjectStore::new("etl-f1-data");
        store.put("sessions/1_sessions.json", b"[]".to_vec(), "application/json").await.unwrap();
        store.put("sessions/1_sessions.json", b"[{}]".to_vec(), "application/json").await.unwrap();
        store.put("meetings/meetings_2025.json", b"[]".to_vec(), "application/json").await.unwrap();

        assert_eq!(store.list("sessions/").await.unwrap(), vec!["sessions/1_sessions.json"]);
        assert_eq!(store.get("sessions/1_sessions.json").await.unwrap(), b"[{}]".to_vec());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryObjectStore::new("etl-f1-data");
        store.set_unavailable(true);
        assert!(store.put("drivers/drivers.json", vec![], "application/json").await.is_err());
        assert!(store.list("").await.is_err());
    }
}
