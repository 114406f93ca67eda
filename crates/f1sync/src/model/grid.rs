use super::{missing_fields, EntityType, MissingKey, Record};
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, FromRow, Postgres};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StartingGridEntry {
    pub meeting_key: i64,
    pub session_key: i64,
    pub driver_number: i64,
    pub position: Option<i32>,
    /// Qualifying lap time in seconds
    pub lap_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStartingGridEntry {
    pub meeting_key: Option<i64>,
    pub session_key: Option<i64>,
    pub driver_number: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub position: Option<i32>,
    #[serde(deserialize_with = "super::lenient")]
    pub lap_duration: Option<f64>,
}

impl Record for StartingGridEntry {
    const ENTITY: EntityType = EntityType::StartingGrids;
    type Raw = RawStartingGridEntry;
    type Key = (i64, i64, i64);

    fn key(&self) -> Self::Key {
        (self.meeting_key, self.session_key, self.driver_number)
    }

    fn from_raw(raw: RawStartingGridEntry) -> Result<Self, MissingKey> {
        let (Some(meeting_key), Some(session_key), Some(driver_number)) =
            (raw.meeting_key, raw.session_key, raw.driver_number)
        else {
            return Err(missing_fields(
                Self::ENTITY,
                &[
                    ("meeting_key", raw.meeting_key.is_some()),
                    ("session_key", raw.session_key.is_some()),
                    ("driver_number", raw.driver_number.is_some()),
                ],
            ));
        };

        Ok(StartingGridEntry {
            meeting_key,
            session_key,
            driver_number,
            position: raw.position,
            lap_duration: raw.lap_duration,
        })
    }

    fn push_values(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.meeting_key)
            .push_bind(self.session_key)
            .push_bind(self.driver_number)
            .push_bind(self.position)
            .push_bind(self.lap_duration);
    }
}
