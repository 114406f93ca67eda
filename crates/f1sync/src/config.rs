//! Configuration management
//!
//! Everything is read from the environment (after loading `.env` if present).
//! `DATABASE_URL`, `RAW_BUCKET` and `PROCESSED_BUCKET` are required: a run
//! without them never starts.

use crate::error::{Result, SyncError};
use crate::storage::config::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Defaults
// ============================================================================

/// OpenF1 API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openf1.org/v1";

/// Season extracted when `SYNC_YEAR` is unset.
pub const DEFAULT_YEAR: i32 = 2025;

/// Per-request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Attempts per fetch before giving up (rate-limit waits excluded).
pub const DEFAULT_FETCH_MAX_ATTEMPTS: u32 = 3;

/// Wait between failed attempts, and after a 429 without `Retry-After`.
pub const DEFAULT_FETCH_RETRY_WAIT_MS: u64 = 3_000;

/// Pause after every completed fetch.
pub const DEFAULT_FETCH_THROTTLE_MS: u64 = 500;

/// 429 responses tolerated within one fetch before it counts as exhausted.
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 20;

/// Longest single wait after a 429, in seconds; larger `Retry-After` values are clamped.
pub const DEFAULT_MAX_RATE_LIMIT_WAIT_SECS: u64 = 60;

/// Root for `raw/` and `processed/` landing directories.
pub const DEFAULT_DATA_ROOT: &str = "local_data";

pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fetch: FetchConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub data_root: PathBuf,
}

/// Upstream API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub base_url: String,
    pub year: i32,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_wait_ms: u64,
    pub throttle_ms: u64,
    pub max_rate_limit_waits: u32,
    pub max_rate_limit_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            year: DEFAULT_YEAR,
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_attempts: DEFAULT_FETCH_MAX_ATTEMPTS,
            retry_wait_ms: DEFAULT_FETCH_RETRY_WAIT_MS,
            throttle_ms: DEFAULT_FETCH_THROTTLE_MS,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
            max_rate_limit_wait_secs: DEFAULT_MAX_RATE_LIMIT_WAIT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from `.env` and the process environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| SyncError::Config(format!("{} environment variable is required", name)))
        };
        let parsed = |name: &str| -> Result<Option<u64>> {
            lookup(name)
                .map(|v| {
                    v.trim()
                        .parse()
                        .map_err(|_| SyncError::Config(format!("{} must be a non-negative integer, got {:?}", name, v)))
                })
                .transpose()
        };
        let parsed_u32 = |name: &str| -> Result<Option<u32>> {
            parsed(name)?
                .map(|n| {
                    u32::try_from(n).map_err(|_| SyncError::Config(format!("{} is out of range, got {}", name, n)))
                })
                .transpose()
        };

        let defaults = FetchConfig::default();
        let fetch = FetchConfig {
            base_url: lookup("OPENF1_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            year: match lookup("SYNC_YEAR") {
                Some(y) => y
                    .trim()
                    .parse()
                    .map_err(|_| SyncError::Config(format!("SYNC_YEAR must be a year, got {:?}", y)))?,
                None => defaults.year,
            },
            timeout_secs: parsed("FETCH_TIMEOUT_SECS")?.unwrap_or(defaults.timeout_secs),
            max_attempts: parsed_u32("FETCH_MAX_ATTEMPTS")?.unwrap_or(defaults.max_attempts),
            retry_wait_ms: parsed("FETCH_RETRY_WAIT_MS")?.unwrap_or(defaults.retry_wait_ms),
            throttle_ms: parsed("FETCH_THROTTLE_MS")?.unwrap_or(defaults.throttle_ms),
            max_rate_limit_waits: parsed_u32("FETCH_MAX_RATE_LIMIT_WAITS")?
                .unwrap_or(defaults.max_rate_limit_waits),
            max_rate_limit_wait_secs: parsed("FETCH_MAX_RATE_LIMIT_WAIT_SECS")?
                .unwrap_or(defaults.max_rate_limit_wait_secs),
        };

        let database = DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: parsed_u32("DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            connect_timeout_secs: parsed("DATABASE_CONNECT_TIMEOUT")?
                .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
        };

        let storage = StorageConfig {
            endpoint: lookup("S3_ENDPOINT"),
            region: lookup("S3_REGION")
                .or_else(|| lookup("AWS_REGION"))
                .unwrap_or_else(|| "us-east-1".to_string()),
            raw_bucket: required("RAW_BUCKET")?,
            processed_bucket: required("PROCESSED_BUCKET")?,
            access_key: lookup("S3_ACCESS_KEY").or_else(|| lookup("AWS_ACCESS_KEY_ID")),
            secret_key: lookup("S3_SECRET_KEY").or_else(|| lookup("AWS_SECRET_ACCESS_KEY")),
            path_style: match lookup("S3_PATH_STYLE") {
                Some(v) => v
                    .trim()
                    .parse()
                    .map_err(|_| SyncError::Config(format!("S3_PATH_STYLE must be true or false, got {:?}", v)))?,
                None => false,
            },
        };

        let config = Config {
            fetch,
            database,
            storage,
            data_root: lookup("DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_ROOT)),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_attempts == 0 {
            return Err(SyncError::Config("FETCH_MAX_ATTEMPTS must be greater than 0".into()));
        }

        if self.fetch.timeout_secs == 0 {
            return Err(SyncError::Config("FETCH_TIMEOUT_SECS must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(SyncError::Config(
                "DATABASE_MAX_CONNECTIONS must be greater than 0".into(),
            ));
        }

        if self.storage.access_key.is_some() != self.storage.secret_key.is_some() {
            return Err(SyncError::Config(
                "S3 access key and secret key must be set together".into(),
            ));
        }

        Ok(())
    }

    /// Local directory holding raw landing blobs
    pub fn raw_root(&self) -> PathBuf {
        self.data_root.join("raw")
    }

    /// Local directory holding processed snapshots
    pub fn processed_root(&self) -> PathBuf {
        self.data_root.join("processed")
    }
}
