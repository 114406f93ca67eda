//! Raw upstream records → typed rows
//!
//! Projection only: no cross-record checks, no deduplication. A rejected
//! record is logged and counted, never fatal.

use crate::model::{EntityType, MissingKey, Record};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Why a raw record did not become a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingKey(MissingKey),
    /// Not an object, or a key field had the wrong JSON type
    Malformed { entity: EntityType, reason: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingKey(missing) => write!(f, "{}", missing),
            Rejection::Malformed { entity, reason } => write!(f, "malformed {} record: {}", entity, reason),
        }
    }
}

impl std::error::Error for Rejection {}

pub fn normalize<R: Record>(raw: &Value) -> Result<R, Rejection> {
    if !raw.is_object() {
        return Err(Rejection::Malformed {
            entity: R::ENTITY,
            reason: format!("expected an object, got {}", json_kind(raw)),
        });
    }

    let shaped = R::Raw::deserialize(raw).map_err(|e| Rejection::Malformed {
        entity: R::ENTITY,
        reason: e.to_string(),
    })?;

    R::from_raw(shaped).map_err(Rejection::MissingKey)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch<R> {
    pub rows: Vec<R>,
    pub rejected: usize,
}

impl<R> Default for NormalizedBatch<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            rejected: 0,
        }
    }
}

pub fn normalize_batch<'a, R, I>(records: I) -> NormalizedBatch<R>
where
    R: Record,
    I: IntoIterator<Item = &'a Value>,
{
    let mut batch = NormalizedBatch::default();
    for raw in records {
        match normalize::<R>(raw) {
            Ok(row) => batch.rows.push(row),
            Err(rejection) => {
                batch.rejected += 1;
                warn!(entity = %R::ENTITY, record = %raw, reason = %rejection, "Skipping record");
            },
        }
    }
    debug!(entity = %R::ENTITY, rows = batch.rows.len(), rejected = batch.rejected, "Normalized batch");
    batch
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
