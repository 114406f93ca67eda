//! Container helpers for tests against real PostgreSQL and MinIO
//!
//! Each test starts its own containers, so tests stay isolated. Everything
//! here needs a running Docker daemon; tests using it are `#[ignore]`d.

#![allow(dead_code)]

use anyhow::{Context, Result};
use f1sync::config::DatabaseConfig;
use f1sync::storage::config::StorageConfig;
use f1sync::storage::S3Storage;
use f1sync::store::PgStore;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

pub const RAW_BUCKET: &str = "etl-f1-data";
pub const PROCESSED_BUCKET: &str = "etl-f1-processed-data";

const MINIO_USER: &str = "minioadmin";
const MINIO_PASSWORD: &str = "minioadmin";

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with the f1sync schema applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    store: PgStore,
    url: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container.get_host().await.context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;
        let url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", url);

        let store = PgStore::connect(&DatabaseConfig {
            url: url.clone(),
            max_connections: 5,
            connect_timeout_secs: 30,
        })
        .await
        .context("Failed to connect to PostgreSQL")?;
        store.migrate().await.context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            store,
            url,
        })
    }

    pub fn store(&self) -> &PgStore {
        &self.store
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

// ============================================================================
// MinIO Test Container
// ============================================================================

/// MinIO container with the raw and processed buckets created
pub struct TestMinio {
    _container: ContainerAsync<GenericImage>,
    config: StorageConfig,
    client: aws_sdk_s3::Client,
}

impl TestMinio {
    pub async fn start() -> Result<Self> {
        info!("Starting MinIO test container...");

        let container = GenericImage::new("minio/minio", "latest")
            .with_exposed_port(9000.tcp())
            .with_wait_for(WaitFor::message_on_stdout("MinIO Object Storage Server"))
            .with_env_var("MINIO_ROOT_USER", MINIO_USER)
            .with_env_var("MINIO_ROOT_PASSWORD", MINIO_PASSWORD)
            .with_cmd(vec!["server", "/data"])
            .start()
            .await
            .context("Failed to start MinIO container")?;

        let host = container.get_host().await.context("Failed to get MinIO host")?;
        let port = container
            .get_host_port_ipv4(9000.tcp())
            .await
            .context("Failed to get MinIO port")?;
        let endpoint = format!("http://{}:{}", host, port);
        debug!("MinIO endpoint: {}", endpoint);

        let config = StorageConfig::for_minio(endpoint, RAW_BUCKET, PROCESSED_BUCKET);
        let client = S3Storage::client(&config).await;

        for bucket in [RAW_BUCKET, PROCESSED_BUCKET] {
            client
                .create_bucket()
                .bucket(bucket)
                .send()
                .await
                .with_context(|| format!("Failed to create bucket {}", bucket))?;
        }

        Ok(Self {
            _container: container,
            config,
            client,
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn raw(&self) -> S3Storage {
        S3Storage::new(self.client.clone(), RAW_BUCKET)
    }

    pub fn processed(&self) -> S3Storage {
        S3Storage::new(self.client.clone(), PROCESSED_BUCKET)
    }
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,f1sync=debug,sqlx=warn,testcontainers=info")),
        )
        .with_test_writer()
        .try_init();
}
