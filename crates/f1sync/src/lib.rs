//! f1sync: OpenF1 season sync
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Mirrors one Formula 1 season from the OpenF1 API into PostgreSQL:
//!
//! - **Extract**: [`extract::Walker`] walks meetings → sessions → results
//!   (plus drivers and starting grids) through a throttled, retrying
//!   [`fetch::Fetcher`] and lands every payload via [`landing::LandingZone`]
//! - **Transform**: [`normalize`] turns raw records into typed rows,
//!   [`merge::Merger`] upserts them and [`snapshot::SnapshotExporter`]
//!   writes one canonical JSON snapshot per table
//! - **Load**: [`load::BulkLoader`] seeds a store from snapshots, skipping keys
//!   that already exist
//!
//! [`pipeline::SyncPipeline`] wires the stages from explicit handles and runs
//! them in the order declared by [`graph::default_graph`].

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod graph;
pub mod landing;
pub mod load;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod snapshot;
pub mod storage;
pub mod store;

pub use config::Config;
pub use error::{Result, SyncError};
pub use model::EntityType;
pub use pipeline::SyncPipeline;
