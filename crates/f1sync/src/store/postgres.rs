//! PostgreSQL store built on sqlx

use super::RelationalStore;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::model::{EntityType, Record};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Rows per multi-row INSERT; 500 × 13 columns stays far below the bind limit
pub const DEFAULT_BATCH_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnConflict {
    Update,
    Skip,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    batch_size: usize,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(max_connections = config.max_connections, "Connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create or update the schema
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self, rows), fields(entity = %R::ENTITY, rows = rows.len()))]
    async fn write<R: Record>(&self, rows: &[R], on_conflict: OnConflict) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let total_chunks = rows.len().div_ceil(self.batch_size);
        let mut affected = 0;

        for (chunk_idx, chunk) in rows.chunks(self.batch_size).enumerate() {
            debug!(chunk = chunk_idx + 1, total_chunks, rows = chunk.len(), "Writing chunk");
            affected += batch_insert(&mut tx, chunk, on_conflict).await?;
        }

        tx.commit().await?;
        Ok(affected)
    }
}

async fn batch_insert<R: Record>(
    tx: &mut Transaction<'_, Postgres>,
    rows: &[R],
    on_conflict: OnConflict,
) -> Result<u64> {
    let entity = R::ENTITY;
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        entity.table(),
        entity.columns().join(", ")
    ));

    query_builder.push_values(rows, |mut b, row| row.push_values(&mut b));
    query_builder.push(conflict_clause(entity, on_conflict));

    let result = query_builder.build().execute(&mut **tx).await?;
    Ok(result.rows_affected())
}

fn conflict_clause(entity: EntityType, on_conflict: OnConflict) -> String {
    let keys = entity.key_columns().join(", ");
    let values = entity.value_columns();
    if on_conflict == OnConflict::Skip || values.is_empty() {
        return format!(" ON CONFLICT ({}) DO NOTHING", keys);
    }

    let assignments: Vec<String> = values
        .iter()
        .map(|col| format!("{col} = EXCLUDED.{col}"))
        .collect();
    format!(" ON CONFLICT ({}) DO UPDATE SET {}", keys, assignments.join(", "))
}

#[async_trait]
impl RelationalStore for PgStore {
    async fn upsert_rows<R: Record>(&self, rows: &[R]) -> Result<u64> {
        self.write(rows, OnConflict::Update).await
    }

    async fn insert_rows_skip_conflicts<R: Record>(&self, rows: &[R]) -> Result<u64> {
        self.write(rows, OnConflict::Skip).await
    }

    async fn fetch_all<R: Record>(&self) -> Result<Vec<R>> {
        let entity = R::ENTITY;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            entity.columns().join(", "),
            entity.table(),
            entity.key_columns().join(", ")
        );
        let rows = sqlx::query_as::<_, R>(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }
}
