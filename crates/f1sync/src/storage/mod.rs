//! Object store access for the landing zone
//!
//! Stages talk to an [`ObjectStore`] handle, one per bucket. Production uses
//! [`S3Storage`]; tests use [`MemoryObjectStore`].

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use memory::MemoryObjectStore;

/// Flat key-value blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket name, for log context
    fn bucket(&self) -> &str;

    /// Create or replace the object at `key`
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Every key under `prefix`, in lexical order
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Build a client usable for both buckets
    pub async fn client(config: &config::StorageConfig) -> Client {
        debug!(endpoint = ?config.endpoint, region = %config.region, "Initializing S3 client");

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(access, secret, None, None, "f1sync"))
                .region(Region::new(config.region.clone())),
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Client::from_conf(builder.build())
    }

    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        info!("Storage client initialized for bucket: {}", bucket);
        Self { client, bucket }
    }
}

fn sdk_error<E>(action: &str, key: &str, err: E) -> SyncError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SyncError::Storage(format!("{} {}: {}", action, key, DisplayErrorContext(err)))
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_error("upload", key, e))?;

        info!("Uploaded to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_error("download", key, e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| sdk_error("read body of", key, e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(data)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| sdk_error("list", prefix, e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        keys.sort();
        Ok(keys)
    }
}
