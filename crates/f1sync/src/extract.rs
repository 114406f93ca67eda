//! Entity graph walker
//!
//! Walks Meetings → Sessions → SessionResults for one season, plus the
//! Drivers roster and per-meeting StartingGrids, landing every payload. Each
//! dependent step only sees keys returned by the step before it.

use crate::error::Result;
use crate::fetch::{QueryParams, RecordSource};
use crate::landing::{LandingKey, LandingZone};
use crate::model::EntityType;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// What one extraction cycle touched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionReport {
    pub year: i32,
    pub meeting_keys: Vec<i64>,
    pub session_pairs: Vec<(i64, i64)>,
    pub blobs_written: usize,
    /// Fetches that exhausted their retry budget; nothing was landed for them
    pub failed_fetches: usize,
    /// Records without the key needed to walk further
    pub skipped_records: usize,
    pub mirror_failures: usize,
}

pub struct Walker<'a> {
    source: &'a dyn RecordSource,
    landing: &'a LandingZone,
}

impl<'a> Walker<'a> {
    pub fn new(source: &'a dyn RecordSource, landing: &'a LandingZone) -> Self {
        Self { source, landing }
    }

    /// Run a full extraction cycle for `year`
    #[instrument(skip(self))]
    pub async fn extract(&self, year: i32) -> Result<ExtractionReport> {
        let mut report = ExtractionReport {
            year,
            ..Default::default()
        };

        for entity in EntityType::ALL {
            self.extract_entity(entity, &mut report).await?;
        }

        info!(
            year,
            meetings = report.meeting_keys.len(),
            sessions = report.session_pairs.len(),
            blobs_written = report.blobs_written,
            failed_fetches = report.failed_fetches,
            skipped_records = report.skipped_records,
            "Extraction cycle complete"
        );
        Ok(report)
    }

    /// One extraction step; reads the keys earlier steps stored in `report`
    pub async fn extract_entity(&self, entity: EntityType, report: &mut ExtractionReport) -> Result<()> {
        match entity {
            EntityType::Meetings => {
                report.meeting_keys = self.extract_meetings(report.year, report).await?;
            },
            EntityType::Drivers => self.extract_drivers(report).await?,
            EntityType::Sessions => {
                let meeting_keys = report.meeting_keys.clone();
                report.session_pairs = self.extract_sessions(&meeting_keys, report).await?;
            },
            EntityType::SessionResults => {
                let pairs = report.session_pairs.clone();
                self.extract_session_results(&pairs, report).await?;
            },
            EntityType::StartingGrids => {
                let meeting_keys = report.meeting_keys.clone();
                self.extract_starting_grids(&meeting_keys, report).await?;
            },
        }
        Ok(())
    }

    pub async fn extract_meetings(&self, year: i32, report: &mut ExtractionReport) -> Result<Vec<i64>> {
        let params = QueryParams::new().with("year", year);
        let Some(records) = self
            .fetch_and_land(EntityType::Meetings, &params, LandingKey::meetings(year), report)
            .await?
        else {
            return Ok(Vec::new());
        };

        let keys = child_keys(&records, "meeting_key", report);
        info!(year, meetings = keys.len(), "Extracted meetings");
        Ok(keys)
    }

    pub async fn extract_drivers(&self, report: &mut ExtractionReport) -> Result<()> {
        let records = self
            .fetch_and_land(EntityType::Drivers, &QueryParams::new(), LandingKey::drivers(), report)
            .await?;
        if let Some(records) = records {
            info!(drivers = records.len(), "Extracted drivers");
        }
        Ok(())
    }

    /// Fetch sessions per meeting and collect `(meeting_key, session_key)` pairs
    pub async fn extract_sessions(
        &self,
        meeting_keys: &[i64],
        report: &mut ExtractionReport,
    ) -> Result<Vec<(i64, i64)>> {
        let mut pairs = Vec::new();
        for &meeting_key in meeting_keys {
            let params = QueryParams::new().with("meeting_key", meeting_key);
            let Some(records) = self
                .fetch_and_land(EntityType::Sessions, &params, LandingKey::sessions(meeting_key), report)
                .await?
            else {
                continue;
            };

            let session_keys = child_keys(&records, "session_key", report);
            info!(meeting_key, sessions = session_keys.len(), "Extracted sessions");
            pairs.extend(session_keys.into_iter().map(|sk| (meeting_key, sk)));
        }
        Ok(pairs)
    }

    pub async fn extract_session_results(
        &self,
        pairs: &[(i64, i64)],
        report: &mut ExtractionReport,
    ) -> Result<()> {
        for &(meeting_key, session_key) in pairs {
            let params = QueryParams::new().with("session_key", session_key);
            let key = LandingKey::session_results(meeting_key, session_key);
            if let Some(records) = self
                .fetch_and_land(EntityType::SessionResults, &params, key, report)
                .await?
            {
                info!(meeting_key, session_key, results = records.len(), "Extracted session results");
            }
        }
        Ok(())
    }

    pub async fn extract_starting_grids(
        &self,
        meeting_keys: &[i64],
        report: &mut ExtractionReport,
    ) -> Result<()> {
        for &meeting_key in meeting_keys {
            let params = QueryParams::new().with("meeting_key", meeting_key);
            let key = LandingKey::starting_grid(meeting_key);
            if let Some(records) = self
                .fetch_and_land(EntityType::StartingGrids, &params, key, report)
                .await?
            {
                info!(meeting_key, entries = records.len(), "Extracted starting grid");
            }
        }
        Ok(())
    }

    /// `None` when the fetch was exhausted; the previous blob, if any, stays in place
    async fn fetch_and_land(
        &self,
        entity: EntityType,
        params: &QueryParams,
        key: LandingKey,
        report: &mut ExtractionReport,
    ) -> Result<Option<Vec<Value>>> {
        let fetched = self.source.fetch(entity, params).await;
        let Some(records) = fetched.records else {
            report.failed_fetches += 1;
            warn!(%entity, %params, "No data this cycle, keeping previous landing blob");
            return Ok(None);
        };

        let receipt = self.landing.store(&key, &records).await?;
        report.blobs_written += 1;
        if !receipt.mirrored {
            report.mirror_failures += 1;
        }
        Ok(Some(records))
    }
}

/// Distinct integer values of `field`, in first-seen order
fn child_keys(records: &[Value], field: &str, report: &mut ExtractionReport) -> Vec<i64> {
    let mut seen = BTreeSet::new();
    let mut keys = Vec::new();
    for record in records {
        match record.get(field).and_then(Value::as_i64) {
            Some(key) => {
                if seen.insert(key) {
                    keys.push(key);
                }
            },
            None => {
                report.skipped_records += 1;
                warn!(field, record = %record, "Record has no usable key, not walking further");
            },
        }
    }
    keys
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::fetch::{FetchOutcome, FetchStatus, Fetched};
    use crate::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Answers from a fixed table and records every call in order
    #[derive(Default)]
    struct ScriptedSource {
        responses: HashMap<(EntityType, String), Option<Value>>,
        calls: Mutex<Vec<(EntityType, String)>>,
    }

    impl ScriptedSource {
        fn respond(mut self, entity: EntityType, params: &str, body: Value) -> Self {
            self.responses.insert((entity, params.to_string()), Some(body));
            self
        }

        fn fail(mut self, entity: EntityType, params: &str) -> Self {
            self.responses.insert((entity, params.to_string()), None);
            self
        }

        fn calls(&self) -> Vec<(EntityType, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, entity: EntityType) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|(e, _)| *e == entity)
                .map(|(_, p)| p)
                .collect()
        }
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn fetch(&self, entity: EntityType, params: &QueryParams) -> Fetched {
            let params = params.to_string();
            self.calls.lock().unwrap().push((entity, params.clone()));
            match self.responses.get(&(entity, params)) {
                Some(None) => Fetched {
                    records: None,
                    outcome: FetchOutcome {
                        attempts: 3,
                        rate_limit_waits: 0,
                        status: FetchStatus::Exhausted {
                            last_error: "HTTP error: 503 Service Unavailable".to_string(),
                        },
                    },
                },
                other => {
                    let records = match other {
                        Some(Some(Value::Array(items))) => items.clone(),
                        _ => Vec::new(),
                    };
                    Fetched {
                        records: Some(records),
                        outcome: FetchOutcome {
                            attempts: 1,
                            rate_limit_waits: 0,
                            status: FetchStatus::Succeeded,
                        },
                    }
                },
            }
        }
    }

    fn zone(dir: &tempfile::TempDir) -> LandingZone {
        LandingZone::new(dir.path(), Arc::new(MemoryObjectStore::new("etl-f1-data")))
    }

    fn two_meeting_season() -> ScriptedSource {
        ScriptedSource::default()
            .respond(EntityType::Meetings, "year=2025", json!([{"meeting_key": 1}, {"meeting_key": 2}]))
            .respond(EntityType::Drivers, "", json!([{"driver_number": 1}]))
            .respond(
                EntityType::Sessions,
                "meeting_key=1",
                json!([{"session_key": 10, "meeting_key": 1}, {"session_key": 11, "meeting_key": 1}]),
            )
            .respond(EntityType::Sessions, "meeting_key=2", json!([{"session_key": 20, "meeting_key": 2}]))
    }

    #[tokio::test]
    async fn test_dependent_fetches_only_use_returned_keys() {
        let dir = tempfile::tempdir().unwrap();
        let landing = zone(&dir);
        let source = two_meeting_season();

        let report = Walker::new(&source, &landing).extract(2025).await.unwrap();

        assert_eq!(report.meeting_keys, vec![1, 2]);
        assert_eq!(report.session_pairs, vec![(1, 10), (1, 11), (2, 20)]);
        assert_eq!(source.calls_for(EntityType::Sessions), vec!["meeting_key=1", "meeting_key=2"]);
        assert_eq!(
            source.calls_for(EntityType::SessionResults),
            vec!["session_key=10", "session_key=11", "session_key=20"]
        );
        assert_eq!(source.calls_for(EntityType::StartingGrids), vec!["meeting_key=1", "meeting_key=2"]);
        assert_eq!(source.calls_for(EntityType::Drivers), vec![""]);

        // 1 meetings + 1 drivers + 2 sessions + 3 results + 2 grids
        assert_eq!(report.blobs_written, 9);
        assert!(dir.path().join("session_results/1_11.json").exists());
        assert!(dir.path().join("starting_grids/2_starting_grid.json").exists());
    }

    #[tokio::test]
    async fn test_all_meetings_known_before_any_session_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let landing = zone(&dir);
        let source = two_meeting_season();

        Walker::new(&source, &landing).extract(2025).await.unwrap();

        let calls = source.calls();
        let index_of = |entity: EntityType| calls.iter().position(|(e, _)| *e == entity).unwrap();
        let last_of = |entity: EntityType| calls.iter().rposition(|(e, _)| *e == entity).unwrap();
        assert!(index_of(EntityType::Meetings) < index_of(EntityType::Sessions));
        assert!(last_of(EntityType::Sessions) < index_of(EntityType::SessionResults));
    }

    #[tokio::test]
    async fn test_zero_meetings_means_no_downstream_calls() {
        let dir = tempfile::tempdir().unwrap();
        let landing = zone(&dir);
        let source = ScriptedSource::default().respond(EntityType::Meetings, "year=2025", json!([]));

        let report = Walker::new(&source, &landing).extract(2025).await.unwrap();

        assert!(report.meeting_keys.is_empty());
        assert!(source.calls_for(EntityType::Sessions).is_empty());
        assert!(source.calls_for(EntityType::SessionResults).is_empty());
        assert!(source.calls_for(EntityType::StartingGrids).is_empty());
        // Drivers do not depend on meetings
        assert_eq!(source.calls_for(EntityType::Drivers).len(), 1);
        let landed = std::fs::read_to_string(dir.path().join("meetings/meetings_2025.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&landed).unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_abort_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let landing = zone(&dir);
        let source = two_meeting_season().fail(EntityType::Sessions, "meeting_key=1");

        let report = Walker::new(&source, &landing).extract(2025).await.unwrap();

        assert_eq!(report.failed_fetches, 1);
        assert_eq!(report.session_pairs, vec![(2, 20)]);
        assert_eq!(source.calls_for(EntityType::SessionResults), vec!["session_key=20"]);
        assert_eq!(source.calls_for(EntityType::StartingGrids).len(), 2);
        assert!(!dir.path().join("sessions/1_sessions.json").exists());
    }

    #[tokio::test]
    async fn test_exhausted_fetch_keeps_previous_blob() {
        let dir = tempfile::tempdir().unwrap();
        let landing = zone(&dir);
        landing
            .store(&LandingKey::sessions(1), &json!([{"session_key": 99}]))
            .await
            .unwrap();
        let source = two_meeting_season().fail(EntityType::Sessions, "meeting_key=1");

        Walker::new(&source, &landing).extract(2025).await.unwrap();

        let kept = std::fs::read_to_string(dir.path().join("sessions/1_sessions.json")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&kept).unwrap(), json!([{"session_key": 99}]));
    }

    #[tokio::test]
    async fn test_records_without_child_key_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let landing = zone(&dir);
        let source = ScriptedSource::default()
            .respond(EntityType::Meetings, "year=2025", json!([{"meeting_key": 1}, {"meeting_name": "x"}]))
            .respond(EntityType::Sessions, "meeting_key=1", json!([{"session_key": null}]));

        let report = Walker::new(&source, &landing).extract(2025).await.unwrap();

        assert_eq!(report.meeting_keys, vec![1]);
        assert!(report.session_pairs.is_empty());
        assert_eq!(report.skipped_records, 2);
        assert!(source.calls_for(EntityType::SessionResults).is_empty());
    }
}
