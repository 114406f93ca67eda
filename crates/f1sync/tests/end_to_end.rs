//! Full pipeline runs against a mock OpenF1 server and in-memory stores

#![allow(clippy::unwrap_used, clippy::expect_used)]

use f1sync::fetch::{Fetcher, RecordingSleeper, RetryPolicy};
use f1sync::landing::LandingZone;
use f1sync::model::{Meeting, Session};
use f1sync::storage::{MemoryObjectStore, ObjectStore};
use f1sync::store::{MemoryStore, RelationalStore};
use f1sync::{EntityType, SyncPipeline};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

struct Harness {
    _server: MockServer,
    dir: TempDir,
    raw_bucket: Arc<MemoryObjectStore>,
    processed_bucket: Arc<MemoryObjectStore>,
    pipeline: SyncPipeline<MemoryStore>,
}

async fn mount(server: &MockServer, api_path: &str, param: Option<(&str, &str)>, body: Value) {
    let mut mock = Mock::given(method("GET")).and(path(format!("/{}", api_path)));
    if let Some((name, value)) = param {
        mock = mock.and(query_param(name, value));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// One meeting with one session; every other endpoint answers `[]`
async fn single_session_season() -> Harness {
    let server = MockServer::start().await;
    mount(
        &server,
        "meetings",
        Some(("year", "2025")),
        json!([{"meeting_key": 1, "meeting_name": "Australian Grand Prix", "year": 2025}]),
    )
    .await;
    mount(
        &server,
        "sessions",
        Some(("meeting_key", "1")),
        json!([{"session_key": 10, "meeting_key": 1, "session_name": "Race", "year": 2025}]),
    )
    .await;
    mount(&server, "drivers", None, json!([])).await;
    mount(&server, "session_result", Some(("session_key", "10")), json!([])).await;
    mount(&server, "starting_grid", Some(("meeting_key", "1")), json!([])).await;

    harness(server)
}

fn harness(server: MockServer) -> Harness {
    let fetcher = Fetcher::new(server.uri(), RetryPolicy::immediate(3), Duration::from_secs(5))
        .unwrap()
        .with_sleeper(Arc::new(RecordingSleeper::new()));

    let dir = tempfile::tempdir().unwrap();
    let raw_bucket = Arc::new(MemoryObjectStore::new("etl-f1-data"));
    let processed_bucket = Arc::new(MemoryObjectStore::new("etl-f1-processed-data"));
    let pipeline = SyncPipeline::new(
        Arc::new(fetcher),
        LandingZone::new(dir.path().join("raw"), raw_bucket.clone()),
        LandingZone::new(dir.path().join("processed"), processed_bucket.clone()),
        MemoryStore::new(),
        2025,
    )
    .unwrap();

    Harness {
        _server: server,
        dir,
        raw_bucket,
        processed_bucket,
        pipeline,
    }
}

#[tokio::test]
async fn test_meeting_and_session_end_up_in_table_and_snapshot() {
    let h = single_session_season().await;

    let report = h.pipeline.run().await.unwrap();

    assert_eq!(report.extraction.meeting_keys, vec![1]);
    assert_eq!(report.extraction.session_pairs, vec![(1, 10)]);
    assert_eq!(report.extraction.failed_fetches, 0);

    let sessions: Vec<Session> = h.pipeline.store().fetch_all().await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_key, 10);
    assert_eq!(sessions[0].meeting_key, Some(1));

    let snapshot_path = h.dir.path().join("processed/sessions/sessions.json");
    let snapshot: Vec<Session> = serde_json::from_slice(&std::fs::read(&snapshot_path).unwrap()).unwrap();
    assert_eq!(snapshot, sessions);

    let uploaded = h.processed_bucket.get("sessions/sessions.json").await.unwrap();
    assert_eq!(uploaded, std::fs::read(&snapshot_path).unwrap());
}

#[tokio::test]
async fn test_run_lands_every_raw_blob() {
    let h = single_session_season().await;

    h.pipeline.run().await.unwrap();

    assert_eq!(
        h.raw_bucket.keys().await,
        vec![
            "drivers/drivers.json",
            "meetings/meetings_2025.json",
            "session_results/1_10.json",
            "sessions/1_sessions.json",
            "starting_grids/1_starting_grid.json",
        ]
    );
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let h = single_session_season().await;

    h.pipeline.run().await.unwrap();
    let meetings_before: Vec<Meeting> = h.pipeline.store().fetch_all().await.unwrap();
    let sessions_before: Vec<Session> = h.pipeline.store().fetch_all().await.unwrap();

    let second = h.pipeline.run().await.unwrap();
    let meetings_after: Vec<Meeting> = h.pipeline.store().fetch_all().await.unwrap();
    let sessions_after: Vec<Session> = h.pipeline.store().fetch_all().await.unwrap();

    assert_eq!(meetings_before, meetings_after);
    assert_eq!(sessions_before, sessions_after);
    // Everything was already merged, so the bulk load inserts nothing
    assert!(second.loads.iter().all(|l| l.report.loaded == 0));
}

#[tokio::test]
async fn test_transform_rejects_keyless_records_without_failing() {
    let server = MockServer::start().await;
    mount(
        &server,
        "meetings",
        Some(("year", "2025")),
        json!([{"meeting_key": 1}, {"meeting_name": "no key"}, {"meeting_key": 2}]),
    )
    .await;
    for meeting in ["1", "2"] {
        mount(&server, "sessions", Some(("meeting_key", meeting)), json!([])).await;
        mount(&server, "starting_grid", Some(("meeting_key", meeting)), json!([])).await;
    }
    mount(&server, "drivers", None, json!([])).await;
    let h = harness(server);

    h.pipeline.extract().await.unwrap();
    let report = h.pipeline.transform(EntityType::Meetings).await.unwrap();

    assert_eq!(report.blobs_read, 1);
    assert_eq!(report.records_seen, 3);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.upserted, 2);
    assert_eq!(report.snapshot.rows, 2);
}

#[tokio::test]
async fn test_bulk_load_seeds_a_fresh_store_from_snapshots() {
    let h = single_session_season().await;
    h.pipeline.extract().await.unwrap();
    h.pipeline.transform_all().await.unwrap();

    // A second pipeline sharing the processed directory but with an empty store
    let fresh = SyncPipeline::new(
        Arc::new(Fetcher::new("http://127.0.0.1:9", RetryPolicy::immediate(1), Duration::from_secs(1)).unwrap()),
        LandingZone::new(h.dir.path().join("raw"), Arc::new(MemoryObjectStore::new("raw"))),
        LandingZone::new(h.dir.path().join("processed"), Arc::new(MemoryObjectStore::new("processed"))),
        MemoryStore::new(),
        2025,
    )
    .unwrap();

    let loads = fresh.load_all().await.unwrap();

    let loaded: u64 = loads.iter().map(|l| l.report.loaded).sum();
    assert_eq!(loaded, 2);
    let sessions: Vec<Session> = fresh.store().fetch_all().await.unwrap();
    let original: Vec<Session> = h.pipeline.store().fetch_all().await.unwrap();
    assert_eq!(sessions, original);
}

#[tokio::test]
async fn test_transform_reads_raw_bucket_on_another_host() {
    let h = single_session_season().await;
    h.pipeline.extract().await.unwrap();

    // Same raw bucket, but none of the extract host's local files
    let elsewhere = tempfile::tempdir().unwrap();
    let transformer = SyncPipeline::new(
        Arc::new(Fetcher::new("http://127.0.0.1:9", RetryPolicy::immediate(1), Duration::from_secs(1)).unwrap()),
        LandingZone::new(elsewhere.path().join("raw"), h.raw_bucket.clone()),
        LandingZone::new(elsewhere.path().join("processed"), Arc::new(MemoryObjectStore::new("processed"))),
        MemoryStore::new(),
        2025,
    )
    .unwrap();

    let report = transformer.transform(EntityType::Sessions).await.unwrap();

    assert_eq!(report.blobs_read, 1);
    assert_eq!(report.upserted, 1);
    let sessions: Vec<Session> = transformer.store().fetch_all().await.unwrap();
    assert_eq!(sessions[0].meeting_key, Some(1));
}

#[tokio::test]
async fn test_exhausted_upstream_yields_empty_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let h = harness(server);

    let report = h.pipeline.run().await.unwrap();

    // meetings and drivers fail; nothing downstream is attempted
    assert_eq!(report.extraction.failed_fetches, 2);
    assert_eq!(report.extraction.blobs_written, 0);
    assert!(report.transforms.iter().all(|t| t.upserted == 0));
    assert_eq!(h.pipeline.store().count(EntityType::Meetings).await, 0);
}
