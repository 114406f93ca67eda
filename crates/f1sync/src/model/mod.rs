//! Entity model
//!
//! Each entity has two shapes: a raw one mirroring the upstream JSON where
//! every field is optional, and a normalized row whose key columns are
//! mandatory. A raw record only becomes a row when its whole composite key
//! is present.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::{postgres::PgRow, query_builder::Separated, FromRow, Postgres};
use std::fmt;
use tracing::warn;

mod driver;
mod grid;
mod meeting;
mod session;
mod session_result;

pub use driver::{Driver, RawDriver};
pub use grid::{RawStartingGridEntry, StartingGridEntry};
pub use meeting::{Meeting, RawMeeting};
pub use session::{RawSession, Session};
pub use session_result::{RawSessionResult, SessionResult};

/// The five synchronized entity types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Meetings,
    Drivers,
    Sessions,
    SessionResults,
    StartingGrids,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Meetings,
        EntityType::Drivers,
        EntityType::Sessions,
        EntityType::SessionResults,
        EntityType::StartingGrids,
    ];

    /// Path segment under the API base URL
    pub fn api_path(self) -> &'static str {
        match self {
            EntityType::Meetings => "meetings",
            EntityType::Drivers => "drivers",
            EntityType::Sessions => "sessions",
            EntityType::SessionResults => "session_result",
            EntityType::StartingGrids => "starting_grid",
        }
    }

    /// Directory (local) and key prefix (object store) in the landing zone
    pub fn landing_dir(self) -> &'static str {
        match self {
            EntityType::Meetings => "meetings",
            EntityType::Drivers => "drivers",
            EntityType::Sessions => "sessions",
            EntityType::SessionResults => "session_results",
            EntityType::StartingGrids => "starting_grids",
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            EntityType::Meetings => "meetings",
            EntityType::Drivers => "drivers",
            EntityType::Sessions => "sessions",
            EntityType::SessionResults => "session_results",
            EntityType::StartingGrids => "starting_grid",
        }
    }

    pub fn key_columns(self) -> &'static [&'static str] {
        match self {
            EntityType::Meetings => &["meeting_key"],
            EntityType::Sessions => &["session_key"],
            EntityType::Drivers | EntityType::SessionResults | EntityType::StartingGrids => {
                &["meeting_key", "session_key", "driver_number"]
            },
        }
    }

    /// Every column, key columns first, in bind order
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            EntityType::Meetings => &[
                "meeting_key",
                "circuit_key",
                "circuit_short_name",
                "meeting_code",
                "location",
                "country_key",
                "country_code",
                "country_name",
                "meeting_name",
                "meeting_official_name",
                "gmt_offset",
                "date_start",
                "year",
            ],
            EntityType::Sessions => &[
                "session_key",
                "meeting_key",
                "session_type",
                "session_name",
                "location",
                "country_code",
                "country_name",
                "circuit_key",
                "circuit_short_name",
                "gmt_offset",
                "date_start",
                "date_end",
                "year",
            ],
            EntityType::Drivers => &[
                "meeting_key",
                "session_key",
                "driver_number",
                "full_name",
                "first_name",
                "last_name",
                "team_name",
            ],
            EntityType::SessionResults => &[
                "meeting_key",
                "session_key",
                "driver_number",
                "position",
                "number_of_laps",
                "dnf",
                "dns",
                "dsq",
            ],
            EntityType::StartingGrids => &[
                "meeting_key",
                "session_key",
                "driver_number",
                "position",
                "lap_duration",
            ],
        }
    }

    /// Columns overwritten on key collision
    pub fn value_columns(self) -> &'static [&'static str] {
        &self.columns()[self.key_columns().len()..]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.landing_dir())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|e| e.landing_dir() == s || e.api_path() == s || e.table() == s)
            .ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

/// A raw record lacked part of its composite key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingKey {
    pub entity: EntityType,
    pub fields: Vec<&'static str>,
}

impl fmt::Display for MissingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} record missing key field(s): {}", self.entity, self.fields.join(", "))
    }
}

impl std::error::Error for MissingKey {}

/// Collects the names of absent key components
pub(crate) fn missing_fields(entity: EntityType, present: &[(&'static str, bool)]) -> MissingKey {
    MissingKey {
        entity,
        fields: present
            .iter()
            .filter(|(_, is_present)| !is_present)
            .map(|(name, _)| *name)
            .collect(),
    }
}

/// Reads a value column without letting type drift sink the record.
///
/// A string holding a scalar is read as that scalar (`"1"` for an integer)
/// and a scalar is read as text where text is expected. Anything else
/// becomes `None`.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    if let Ok(parsed) = T::deserialize(&value) {
        return Ok(Some(parsed));
    }

    let coerced = match &value {
        Value::String(s) => serde_json::from_str::<Value>(s.trim()).ok(),
        Value::Number(_) | Value::Bool(_) => Some(Value::String(value.to_string())),
        _ => None,
    };
    if let Some(parsed) = coerced.and_then(|c| T::deserialize(c).ok()) {
        return Ok(Some(parsed));
    }

    warn!(
        value = %value,
        expected = std::any::type_name::<T>(),
        "Dropping value of unexpected type"
    );
    Ok(None)
}

/// A normalized row of one entity table
pub trait Record:
    Serialize
    + DeserializeOwned
    + for<'r> FromRow<'r, PgRow>
    + Clone
    + fmt::Debug
    + PartialEq
    + Send
    + Sync
    + Unpin
    + 'static
{
    const ENTITY: EntityType;

    /// Upstream shape, every field optional
    type Raw: DeserializeOwned;

    /// Composite natural key
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    fn key(&self) -> Self::Key;

    fn from_raw(raw: Self::Raw) -> Result<Self, MissingKey>;

    /// Bind every column in [`EntityType::columns`] order
    fn push_values(&self, row: &mut Separated<'_, '_, Postgres, &'static str>);
}
