use super::{missing_fields, EntityType, MissingKey, Record};
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, FromRow, Postgres};

/// One on-track session (practice, qualifying, sprint, race) of a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub session_key: i64,
    pub meeting_key: Option<i64>,
    pub session_type: Option<String>,
    pub session_name: Option<String>,
    pub location: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub circuit_key: Option<i64>,
    pub circuit_short_name: Option<String>,
    pub gmt_offset: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSession {
    pub session_key: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub meeting_key: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub session_type: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub session_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub location: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub country_code: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub country_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub circuit_key: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub circuit_short_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub gmt_offset: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub date_start: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub date_end: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub year: Option<i32>,
}

impl Record for Session {
    const ENTITY: EntityType = EntityType::Sessions;
    type Raw = RawSession;
    type Key = i64;

    fn key(&self) -> i64 {
        self.session_key
    }

    fn from_raw(raw: RawSession) -> Result<Self, MissingKey> {
        let Some(session_key) = raw.session_key else {
            return Err(missing_fields(Self::ENTITY, &[("session_key", false)]));
        };

        Ok(Session {
            session_key,
            meeting_key: raw.meeting_key,
            session_type: raw.session_type,
            session_name: raw.session_name,
            location: raw.location,
            country_code: raw.country_code,
            country_name: raw.country_name,
            circuit_key: raw.circuit_key,
            circuit_short_name: raw.circuit_short_name,
            gmt_offset: raw.gmt_offset,
            date_start: raw.date_start,
            date_end: raw.date_end,
            year: raw.year,
        })
    }

    fn push_values(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.session_key)
            .push_bind(self.meeting_key)
            .push_bind(self.session_type.clone())
            .push_bind(self.session_name.clone())
            .push_bind(self.location.clone())
            .push_bind(self.country_code.clone())
            .push_bind(self.country_name.clone())
            .push_bind(self.circuit_key)
            .push_bind(self.circuit_short_name.clone())
            .push_bind(self.gmt_offset.clone())
            .push_bind(self.date_start.clone())
            .push_bind(self.date_end.clone())
            .push_bind(self.year);
    }
}
