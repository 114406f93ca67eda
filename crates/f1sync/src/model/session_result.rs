use super::{missing_fields, EntityType, MissingKey, Record};
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, FromRow, Postgres};

/// Classification of one driver at the end of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SessionResult {
    pub meeting_key: i64,
    pub session_key: i64,
    pub driver_number: i64,
    pub position: Option<i32>,
    pub number_of_laps: Option<i32>,
    /// Did not finish
    pub dnf: Option<bool>,
    /// Did not start
    pub dns: Option<bool>,
    /// Disqualified
    pub dsq: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSessionResult {
    pub meeting_key: Option<i64>,
    pub session_key: Option<i64>,
    pub driver_number: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub position: Option<i32>,
    #[serde(deserialize_with = "super::lenient")]
    pub number_of_laps: Option<i32>,
    #[serde(deserialize_with = "super::lenient")]
    pub dnf: Option<bool>,
    #[serde(deserialize_with = "super::lenient")]
    pub dns: Option<bool>,
    #[serde(deserialize_with = "super::lenient")]
    pub dsq: Option<bool>,
}

impl Record for SessionResult {
    const ENTITY: EntityType = EntityType::SessionResults;
    type Raw = RawSessionResult;
    type Key = (i64, i64, i64);

    fn key(&self) -> Self::Key {
        (self.meeting_key, self.session_key, self.driver_number)
    }

    fn from_raw(raw: RawSessionResult) -> Result<Self, MissingKey> {
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

        Ok(SessionResult {
            meeting_key,
            session_key,
            driver_number,
            position: raw.position,
            number_of_laps: raw.number_of_laps,
            dnf: raw.dnf,
            dns: raw.dns,
            dsq: raw.dsq,
        })
    }

    fn push_values(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.meeting_key)
            .push_bind(self.session_key)
            .push_bind(self.driver_number)
            .push_bind(self.position)
            .push_bind(self.number_of_laps)
            .push_bind(self.dnf)
            .push_bind(self.dns)
            .push_bind(self.dsq);
    }
}
