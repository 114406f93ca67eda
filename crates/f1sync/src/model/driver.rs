use super::{missing_fields, EntityType, MissingKey, Record};
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, FromRow, Postgres};

/// Roster entry for one driver in one session.
///
/// Not a global driver registry: the same person appears once per
/// (meeting, session) they took part in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Driver {
    pub meeting_key: i64,
    pub session_key: i64,
    pub driver_number: i64,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub team_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDriver {
    pub meeting_key: Option<i64>,
    pub session_key: Option<i64>,
    pub driver_number: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub last_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub team_name: Option<String>,
}

impl Record for Driver {
    const ENTITY: EntityType = EntityType::Drivers;
    type Raw = RawDriver;
    type Key = (i64, i64, i64);

    fn key(&self) -> Self::Key {
        (self.meeting_key, self.session_key, self.driver_number)
    }

    fn from_raw(raw: RawDriver) -> Result<Self, MissingKey> {
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

        Ok(Driver {
            meeting_key,
            session_key,
            driver_number,
            full_name: raw.full_name,
            first_name: raw.first_name,
            last_name: raw.last_name,
            team_name: raw.team_name,
        })
    }

    fn push_values(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.meeting_key)
            .push_bind(self.session_key)
            .push_bind(self.driver_number)
            .push_bind(self.full_name.clone())
            .push_bind(self.first_name.clone())
            .push_bind(self.last_name.clone())
            .push_bind(self.team_name.clone());
    }
}
