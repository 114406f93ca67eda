//! Landing zone: addressed JSON blobs on local disk, mirrored to an object store
//!
//! The local copy is authoritative for the rest of a run. Mirror uploads that
//! fail are logged and otherwise ignored, so an object-store outage never
//! stops extraction. A reader without the local directory falls back to the
//! bucket.

use crate::error::{Result, SyncError};
use crate::model::EntityType;
use crate::storage::ObjectStore;
use f1sync_common::checksum::sha256_hex;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Address of one blob: `{entity dir}/{name}.json`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LandingKey {
    entity: EntityType,
    name: String,
}

impl LandingKey {
    pub fn new(entity: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity,
            name: name.into(),
        }
    }

    pub fn meetings(year: i32) -> Self {
        Self::new(EntityType::Meetings, format!("meetings_{}", year))
    }

    pub fn drivers() -> Self {
        Self::new(EntityType::Drivers, "drivers")
    }

    pub fn sessions(meeting_key: i64) -> Self {
        Self::new(EntityType::Sessions, format!("{}_sessions", meeting_key))
    }

    pub fn session_results(meeting_key: i64, session_key: i64) -> Self {
        Self::new(EntityType::SessionResults, format!("{}_{}", meeting_key, session_key))
    }

    pub fn starting_grid(meeting_key: i64) -> Self {
        Self::new(EntityType::StartingGrids, format!("{}_starting_grid", meeting_key))
    }

    /// The canonical processed snapshot of a whole table
    pub fn snapshot(entity: EntityType) -> Self {
        Self::new(entity, entity.landing_dir())
    }

    pub fn entity(&self) -> EntityType {
        self.entity
    }

    pub fn object_key(&self) -> String {
        format!("{}/{}.json", self.entity.landing_dir(), self.name)
    }

    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.entity.landing_dir()).join(format!("{}.json", self.name))
    }
}

#[derive(Debug, Clone)]
pub struct LandingReceipt {
    pub local_path: PathBuf,
    pub object_key: String,
    pub sha256: String,
    pub bytes: usize,
    /// False when the mirror upload failed
    pub mirrored: bool,
}

/// A blob read back from the local landing directory
#[derive(Debug, Clone)]
pub struct LandingBlob {
    pub path: PathBuf,
    pub content: Value,
}

/// One landing area (raw or processed): a local root plus its bucket mirror
pub struct LandingZone {
    root: PathBuf,
    mirror: Arc<dyn ObjectStore>,
}

impl LandingZone {
    pub fn new(root: impl Into<PathBuf>, mirror: Arc<dyn ObjectStore>) -> Self {
        Self {
            root: root.into(),
            mirror,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entity_dir(&self, entity: EntityType) -> PathBuf {
        self.root.join(entity.landing_dir())
    }

    /// Write `payload` under `key`, replacing any previous blob, then mirror it
    pub async fn store<T>(&self, key: &LandingKey, payload: &T) -> Result<LandingReceipt>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec_pretty(payload)?;
        let local_path = self.root.join(key.relative_path());

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Readers never observe a half-written blob
        let staging = local_path.with_extension("json.tmp");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &local_path).await?;

        let object_key = key.object_key();
        let sha256 = sha256_hex(&bytes);
        let size = bytes.len();

        let mirrored = match self.mirror.put(&object_key, bytes, JSON_CONTENT_TYPE).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    bucket = self.mirror.bucket(),
                    key = %object_key,
                    error = %e,
                    "Mirror upload failed, keeping local copy"
                );
                false
            },
        };

        debug!(path = %local_path.display(), bytes = size, mirrored, "Stored landing blob");

        Ok(LandingReceipt {
            local_path,
            object_key,
            sha256,
            bytes: size,
            mirrored,
        })
    }

    /// Every `*.json` path under the entity's directory, sorted
    pub async fn paths(&self, entity: EntityType) -> Result<Vec<PathBuf>> {
        let dir = self.entity_dir(entity);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Parse every blob of the entity; unreadable blobs are skipped.
    ///
    /// The local directory is authoritative when it exists. Without it the
    /// blobs are read back from the bucket, so a stage can run on a host that
    /// never saw the previous stage's local files.
    pub async fn read_prefix(&self, entity: EntityType) -> Result<Vec<LandingBlob>> {
        let (blobs, source) = if tokio::fs::try_exists(self.entity_dir(entity)).await? {
            (self.read_local(entity).await?, "local")
        } else {
            (self.read_mirror(entity).await?, "mirror")
        };
        info!(%entity, blobs = blobs.len(), source, root = %self.root.display(), "Read landing prefix");
        Ok(blobs)
    }

    async fn read_local(&self, entity: EntityType) -> Result<Vec<LandingBlob>> {
        let mut blobs = Vec::new();
        for path in self.paths(entity).await? {
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(SyncError::from)
                .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(Into::into));
            match parsed {
                Ok(content) => blobs.push(LandingBlob { path, content }),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable landing blob"),
            }
        }
        Ok(blobs)
    }

    async fn read_mirror(&self, entity: EntityType) -> Result<Vec<LandingBlob>> {
        let prefix = format!("{}/", entity.landing_dir());
        let mut blobs = Vec::new();
        for key in self.mirror.list(&prefix).await? {
            let Some(name) = key.strip_prefix(&prefix) else {
                continue;
            };
            if name.contains('/') || !name.ends_with(".json") {
                continue;
            }
            let parsed = match self.mirror.get(&key).await {
                Ok(bytes) => serde_json::from_slice::<Value>(&bytes).map_err(SyncError::from),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(content) => blobs.push(LandingBlob {
                    path: self.root.join(&key),
                    content,
                }),
                Err(e) => warn!(
                    bucket = self.mirror.bucket(),
                    key = %key,
                    error = %e,
                    "Skipping unreadable mirrored blob"
                ),
            }
        }
        Ok(blobs)
    }
}
