use super::{missing_fields, EntityType, MissingKey, Record};
use serde::{Deserialize, Serialize};
use sqlx::{query_builder::Separated, FromRow, Postgres};

/// A race weekend; root of the entity graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Meeting {
    pub meeting_key: i64,
    pub circuit_key: Option<i64>,
    pub circuit_short_name: Option<String>,
    pub meeting_code: Option<String>,
    pub location: Option<String>,
    pub country_key: Option<i64>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub meeting_name: Option<String>,
    pub meeting_official_name: Option<String>,
    pub gmt_offset: Option<String>,
    pub date_start: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawMeeting {
    pub meeting_key: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub circuit_key: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub circuit_short_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub meeting_code: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub location: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub country_key: Option<i64>,
    #[serde(deserialize_with = "super::lenient")]
    pub country_code: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub country_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub meeting_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub meeting_official_name: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub gmt_offset: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub date_start: Option<String>,
    #[serde(deserialize_with = "super::lenient")]
    pub year: Option<i32>,
}

impl Record for Meeting {
    const ENTITY: EntityType = EntityType::Meetings;
    type Raw = RawMeeting;
    type Key = i64;

    fn key(&self) -> i64 {
        self.meeting_key
    }

    fn from_raw(raw: RawMeeting) -> Result<Self, MissingKey> {
        let Some(meeting_key) = raw.meeting_key else {
            return Err(missing_fields(Self::ENTITY, &[("meeting_key", false)]));
        };

        Ok(Meeting {
            meeting_key,
            circuit_key: raw.circuit_key,
            circuit_short_name: raw.circuit_short_name,
            meeting_code: raw.meeting_code,
            location: raw.location,
            country_key: raw.country_key,
            country_code: raw.country_code,
            country_name: raw.country_name,
            meeting_name: raw.meeting_name,
            meeting_official_name: raw.meeting_official_name,
            gmt_offset: raw.gmt_offset,
            date_start: raw.date_start,
            year: raw.year,
        })
    }

    fn push_values(&self, row: &mut Separated<'_, '_, Postgres, &'static str>) {
        row.push_bind(self.meeting_key)
            .push_bind(self.circuit_key)
            .push_bind(self.circuit_short_name.clone())
            .push_bind(self.meeting_code.clone())
            .push_bind(self.location.clone())
            .push_bind(self.country_key)
            .push_bind(self.country_code.clone())
            .push_bind(self.country_name.clone())
            .push_bind(self.meeting_name.clone())
            .push_bind(self.meeting_official_name.clone())
            .push_bind(self.gmt_offset.clone())
            .push_bind(self.date_start.clone())
            .push_bind(self.year);
    }
}
