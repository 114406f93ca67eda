//! f1sync common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Pieces shared by the `f1sync` pipeline binary and its tests:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//! - **Checksums**: SHA-256 digests for landing-zone blobs
//!
//! # Example
//!
//! ```no_run
//! use f1sync_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod logging;
