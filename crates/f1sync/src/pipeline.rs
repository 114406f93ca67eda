//! Sync pipeline: extract → transform → load, wired from explicit handles
//!
//! Every stage is callable on its own; [`SyncPipeline::run`] executes the
//! whole stage graph in dependency order.

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::extract::{ExtractionReport, Walker};
use crate::fetch::{Fetcher, RecordSource};
use crate::graph::{self, StageGraph};
use crate::landing::LandingZone;
use crate::load::{BulkLoader, LoadReport};
use crate::merge::Merger;
use crate::model::{Driver, EntityType, Meeting, Record, Session, SessionResult, StartingGridEntry};
use crate::normalize::normalize_batch;
use crate::snapshot::{Snapshot, SnapshotExporter};
use crate::storage::S3Storage;
use crate::store::{PgStore, RelationalStore};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TransformReport {
    pub entity: EntityType,
    pub blobs_read: usize,
    pub records_seen: usize,
    pub rejected: usize,
    pub upserted: u64,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone)]
pub struct EntityLoad {
    pub entity: EntityType,
    pub report: LoadReport,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extraction: ExtractionReport,
    pub transforms: Vec<TransformReport>,
    pub loads: Vec<EntityLoad>,
}

/// What a stage name asks the pipeline to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageAction {
    Extract(EntityType),
    Transform(EntityType),
    Load,
}

fn stage_action(name: &str) -> Option<StageAction> {
    if name == graph::LOAD_STAGE {
        return Some(StageAction::Load);
    }
    EntityType::ALL.into_iter().find_map(|entity| {
        if name == graph::extract_stage(entity) {
            Some(StageAction::Extract(entity))
        } else if name == graph::transform_stage(entity) {
            Some(StageAction::Transform(entity))
        } else {
            None
        }
    })
}

pub struct SyncPipeline<S> {
    source: Arc<dyn RecordSource>,
    raw: LandingZone,
    processed: LandingZone,
    store: S,
    graph: StageGraph,
    year: i32,
}

impl SyncPipeline<PgStore> {
    /// Production wiring: OpenF1 fetcher, S3 buckets, PostgreSQL with migrations applied
    pub async fn from_config(config: &Config) -> Result<Self> {
        let fetcher = Fetcher::from_config(&config.fetch)?;

        let client = S3Storage::client(&config.storage).await;
        let raw_bucket = S3Storage::new(client.clone(), config.storage.raw_bucket.clone());
        let processed_bucket = S3Storage::new(client, config.storage.processed_bucket.clone());

        let store = PgStore::connect(&config.database).await?;
        store.migrate().await?;

        Self::new(
            Arc::new(fetcher),
            LandingZone::new(config.raw_root(), Arc::new(raw_bucket)),
            LandingZone::new(config.processed_root(), Arc::new(processed_bucket)),
            store,
            config.fetch.year,
        )
    }
}

impl<S: RelationalStore> SyncPipeline<S> {
    pub fn new(
        source: Arc<dyn RecordSource>,
        raw: LandingZone,
        processed: LandingZone,
        store: S,
        year: i32,
    ) -> Result<Self> {
        Ok(Self {
            source,
            raw,
            processed,
            store,
            graph: graph::default_graph()?,
            year,
        })
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    fn walker(&self) -> Walker<'_> {
        Walker::new(self.source.as_ref(), &self.raw)
    }

    pub async fn extract(&self) -> Result<ExtractionReport> {
        self.walker().extract(self.year).await
    }

    pub async fn transform(&self, entity: EntityType) -> Result<TransformReport> {
        match entity {
            EntityType::Meetings => self.transform_records::<Meeting>().await,
            EntityType::Drivers => self.transform_records::<Driver>().await,
            EntityType::Sessions => self.transform_records::<Session>().await,
            EntityType::SessionResults => self.transform_records::<SessionResult>().await,
            EntityType::StartingGrids => self.transform_records::<StartingGridEntry>().await,
        }
    }

    pub async fn transform_all(&self) -> Result<Vec<TransformReport>> {
        let mut reports = Vec::with_capacity(EntityType::ALL.len());
        for entity in EntityType::ALL {
            reports.push(self.transform(entity).await?);
        }
        Ok(reports)
    }

    /// Raw prefix → rows → merge → snapshot
    #[instrument(skip(self), fields(entity = %R::ENTITY))]
    async fn transform_records<R: Record>(&self) -> Result<TransformReport> {
        let blobs = self.raw.read_prefix(R::ENTITY).await?;
        let blobs_read = blobs.len();

        let mut records: Vec<Value> = Vec::new();
        for blob in blobs {
            match blob.content {
                Value::Array(items) => records.extend(items),
                _ => warn!(path = %blob.path.display(), "Raw blob is not a JSON array, skipping"),
            }
        }

        let batch = normalize_batch::<R, _>(&records);
        let rejected = batch.rejected;
        let merged = Merger::new(&self.store).merge(batch.rows).await?;
        let snapshot = SnapshotExporter::new(&self.store, &self.processed).export::<R>().await?;

        info!(
            entity = %R::ENTITY,
            blobs = blobs_read,
            processed = records.len(),
            skipped = rejected,
            upserted = merged.applied,
            snapshot_rows = snapshot.rows,
            "Transform complete"
        );
        Ok(TransformReport {
            entity: R::ENTITY,
            blobs_read,
            records_seen: records.len(),
            rejected,
            upserted: merged.applied,
            snapshot,
        })
    }

    pub async fn load(&self, entity: EntityType) -> Result<LoadReport> {
        match entity {
            EntityType::Meetings => self.load_records::<Meeting>().await,
            EntityType::Drivers => self.load_records::<Driver>().await,
            EntityType::Sessions => self.load_records::<Session>().await,
            EntityType::SessionResults => self.load_records::<SessionResult>().await,
            EntityType::StartingGrids => self.load_records::<StartingGridEntry>().await,
        }
    }

    pub async fn load_all(&self) -> Result<Vec<EntityLoad>> {
        let mut loads = Vec::with_capacity(EntityType::ALL.len());
        for entity in EntityType::ALL {
            let report = self.load(entity).await?;
            loads.push(EntityLoad { entity, report });
        }
        Ok(loads)
    }

    async fn load_records<R: Record>(&self) -> Result<LoadReport> {
        let loader = BulkLoader::new(&self.store, &self.processed);
        let paths = loader.snapshot_paths(R::ENTITY).await?;
        loader.load::<R>(&paths).await
    }

    /// Every stage of the graph, in dependency order
    #[instrument(skip(self), fields(year = self.year))]
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, year = self.year, "Starting sync run");

        let walker = self.walker();
        let mut extraction = ExtractionReport {
            year: self.year,
            ..Default::default()
        };
        let mut transforms = Vec::new();
        let mut loads = Vec::new();

        for stage in self.graph.order()? {
            let action = stage_action(&stage.name)
                .ok_or_else(|| SyncError::Graph(format!("no handler for stage {}", stage.name)))?;
            info!(%run_id, stage = %stage.name, "Running stage");
            match action {
                StageAction::Extract(entity) => walker.extract_entity(entity, &mut extraction).await?,
                StageAction::Transform(entity) => transforms.push(self.transform(entity).await?),
                StageAction::Load => loads = self.load_all().await?,
            }
        }

        let finished_at = Utc::now();
        info!(
            %run_id,
            duration_secs = start.elapsed().as_secs_f64(),
            blobs_written = extraction.blobs_written,
            failed_fetches = extraction.failed_fetches,
            upserted = transforms.iter().map(|t| t.upserted).sum::<u64>(),
            loaded = loads.iter().map(|l| l.report.loaded).sum::<u64>(),
            "Sync run complete"
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            extraction,
            transforms,
            loads,
        })
    }
}
