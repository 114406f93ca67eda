use serde::{Deserialize, Serialize};

/// Object store settings shared by the raw and processed buckets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible stores (MinIO, Supabase storage)
    pub endpoint: Option<String>,
    pub region: String,
    /// Landing zone for raw API payloads
    pub raw_bucket: String,
    /// Landing zone for canonical table snapshots
    pub processed_bucket: String,
    /// Static credentials; when unset the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn for_minio(
        endpoint: impl Into<String>,
        raw_bucket: impl Into<String>,
        processed_bucket: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            raw_bucket: raw_bucket.into(),
            processed_bucket: processed_bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }
}
