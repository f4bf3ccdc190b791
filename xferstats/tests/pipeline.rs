use chrono::Duration;
use serde_json::json;
use xferstats::error::ErrorKind;
use xferstats::geo::GeoEnricher;
use xferstats::identity::record_id;
use xferstats::partition::PARTITION_SCHEMA;
use xferstats::pipeline::Pipeline;
use xferstats::source::memory::MemorySource;
use xferstats::store::memory::MemoryStore;
use xferstats::test_utils::faulty_store::{Fault, FaultyStore};
use xferstats::test_utils::fixtures::{
    GARBAGE_LINE, PEER_STATS_LINE, UPLOAD_LINE, entry, sample_geo_lookup, utc,
};
use xferstats::types::RawLogEntry;
use xferstats_config::shared::{BatchConfig, PipelineConfig};
use xferstats_telemetry::tracing::init_test_tracing;

const DAY_PARTITION: &str = "htcondor-xfer-stats-2020.01.02";

fn pipeline_config(max_workers: u16, max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        max_workers,
        batch: BatchConfig {
            max_size: 2,
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
        ..PipelineConfig::default()
    }
}

fn memory_pipeline(
    entries: Vec<RawLogEntry>,
    store: MemoryStore,
) -> Pipeline<MemorySource, MemoryStore> {
    Pipeline::new(
        pipeline_config(5, 3),
        MemorySource::new(entries),
        store,
        GeoEnricher::new(sample_geo_lookup()),
    )
}

#[tokio::test]
async fn peer_stats_line_is_stored_with_geo_data() {
    init_test_tracing();

    let store = MemoryStore::new();
    let shipped_at = utc(2020, 1, 2, 10, 0) + Duration::seconds(5);
    let pipeline = memory_pipeline(vec![entry(PEER_STATS_LINE, 4096, shipped_at)], store.clone());

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.written(), 1);

    let id = record_id(PEER_STATS_LINE, "submit-1.example.org", 4096);
    let document = store.document(DAY_PARTITION, id.as_str()).await.unwrap();
    assert_eq!(document["CreateDate"], json!("2020-01-02T10:00:00Z"));
    assert_eq!(document["Bytes"], json!(1024));
    assert_eq!(document["dest"], json!("8.8.8.8"));
    assert_eq!(document["tags"], json!(["peer_stats", "download"]));
    assert_eq!(document["host"], json!("submit-1.example.org"));
    assert_eq!(document["message"], json!(PEER_STATS_LINE));
    assert_eq!(document["location"], json!([-97.822, 37.751]));
    assert_eq!(document["geoip"]["ip"], json!("8.8.8.8"));
    assert_eq!(document["geoip"]["country_code2"], json!("US"));
    assert_eq!(document["geoip"]["location"], json!([-97.822, 37.751]));
}

#[tokio::test]
async fn destination_with_a_port_is_stored_under_its_address() {
    init_test_tracing();

    let line = "01/02/2020 10:00:00 (peer stats): Bytes: 1024 dest: 8.8.8.8:9618";
    let store = MemoryStore::new();
    let shipped_at = utc(2020, 1, 2, 10, 1);
    let pipeline = memory_pipeline(vec![entry(line, 12, shipped_at)], store.clone());

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.written(), 1);
    assert_eq!(report.failed_writes(), 0);

    let id = record_id(line, "submit-1.example.org", 12);
    let document = store.document(DAY_PARTITION, id.as_str()).await.unwrap();
    assert_eq!(document["dest"], json!("8.8.8.8"));
    assert_eq!(document["dest_raw"], json!("8.8.8.8:9618"));
    assert_eq!(document["geoip"]["ip"], json!("8.8.8.8"));
    assert_eq!(PARTITION_SCHEMA.check_document(&document), Ok(()));
}

#[tokio::test]
async fn geo_data_without_coordinates_has_no_location() {
    init_test_tracing();

    let store = MemoryStore::new();
    let shipped_at = utc(2020, 1, 2, 10, 6);
    let pipeline = memory_pipeline(vec![entry(UPLOAD_LINE, 1, shipped_at)], store.clone());

    pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(60))
        .await
        .unwrap();

    let id = record_id(UPLOAD_LINE, "submit-1.example.org", 1);
    let document = store.document(DAY_PARTITION, id.as_str()).await.unwrap();
    assert_eq!(document["tags"], json!(["upload"]));
    assert_eq!(document["Seconds"], json!(1.5));
    assert_eq!(document["geoip"]["country_name"], json!("Australia"));
    assert!(!document.contains_key("location"));
    assert!(document["geoip"].get("latitude").is_none());
}

#[tokio::test]
async fn reingesting_entries_converges_to_one_record_each() {
    init_test_tracing();

    let store = MemoryStore::new();
    let shipped_at = utc(2020, 1, 2, 10, 30);
    let entries = vec![
        entry(PEER_STATS_LINE, 1, shipped_at),
        entry(PEER_STATS_LINE, 1, shipped_at),
        entry(UPLOAD_LINE, 2, shipped_at),
    ];
    let pipeline = memory_pipeline(entries, store.clone());

    for _ in 0..3 {
        let report = pipeline
            .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(15))
            .await
            .unwrap();
        assert!(report.is_success());
    }

    assert_eq!(store.total_documents().await, 2);
    assert_eq!(store.documents(DAY_PARTITION).await.len(), 2);
}

#[tokio::test]
async fn records_are_routed_by_their_own_event_day() {
    init_test_tracing();

    let store = MemoryStore::new();
    // Logged just before midnight two days earlier, shipped late.
    let late_line = "12/31/2019 23:59:59 (peer stats): Bytes: 1 dest: 8.8.8.8";
    let shipped_at = utc(2020, 1, 2, 0, 10);
    let pipeline = memory_pipeline(vec![entry(late_line, 7, shipped_at)], store.clone());

    let report = pipeline
        .run_range(utc(2020, 1, 2, 0, 0), utc(2020, 1, 2, 1, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(
        store.partitions().await,
        vec![
            "htcondor-xfer-stats-2019.12.31",
            "htcondor-xfer-stats-2020.01.01",
            "htcondor-xfer-stats-2020.01.02",
        ]
    );
    assert_eq!(
        store.schema("htcondor-xfer-stats-2019.12.31").await,
        Some(PARTITION_SCHEMA)
    );

    let id = record_id(late_line, "submit-1.example.org", 7);
    assert!(
        store
            .document("htcondor-xfer-stats-2019.12.31", id.as_str())
            .await
            .is_some()
    );
    assert!(store.documents(DAY_PARTITION).await.is_empty());
}

#[tokio::test]
async fn unparseable_lines_are_skipped_and_counted() {
    init_test_tracing();

    let store = MemoryStore::new();
    let shipped_at = utc(2020, 1, 2, 10, 1);
    let entries = vec![
        entry(GARBAGE_LINE, 1, shipped_at),
        entry("01/02/2020 10:00:00 nothing to extract", 2, shipped_at),
        entry(PEER_STATS_LINE, 3, shipped_at),
    ];
    let pipeline = memory_pipeline(entries, store.clone());

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.scanned(), 3);
    assert_eq!(report.skipped(), 2);
    assert_eq!(report.written(), 1);
    assert_eq!(report.completed[0].skipped["malformed_line"], 1);
    assert_eq!(report.completed[0].skipped["no_key_values"], 1);
    assert_eq!(store.total_documents().await, 1);
}

#[tokio::test]
async fn transient_write_failures_are_retried() {
    init_test_tracing();

    let store = FaultyStore::new(MemoryStore::new());
    store.inject([Fault::Request, Fault::FirstItem(503)]).await;

    let shipped_at = utc(2020, 1, 2, 10, 1);
    let pipeline = Pipeline::new(
        pipeline_config(1, 3),
        MemorySource::new(vec![
            entry(PEER_STATS_LINE, 1, shipped_at),
            entry(UPLOAD_LINE, 2, shipped_at),
        ]),
        store.clone(),
        GeoEnricher::new(sample_geo_lookup()),
    );

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    let window_report = &report.completed[0];
    assert_eq!(window_report.written, 2);
    assert_eq!(window_report.failed_writes, 0);
    assert_eq!(window_report.retries, 2);
    assert_eq!(store.bulk_requests().await, 3);
    assert_eq!(store.inner().total_documents().await, 2);
}

#[tokio::test]
async fn rejected_records_are_counted_as_failed_writes() {
    init_test_tracing();

    let store = FaultyStore::new(MemoryStore::new());
    store.inject([Fault::FirstItem(400)]).await;

    let shipped_at = utc(2020, 1, 2, 10, 1);
    let pipeline = Pipeline::new(
        pipeline_config(1, 3),
        MemorySource::new(vec![
            entry(PEER_STATS_LINE, 1, shipped_at),
            entry(UPLOAD_LINE, 2, shipped_at),
        ]),
        store.clone(),
        GeoEnricher::new(sample_geo_lookup()),
    );

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 11, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.written(), 1);
    assert_eq!(report.failed_writes(), 1);
    assert_eq!(store.bulk_requests().await, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_only_the_affected_window() {
    init_test_tracing();

    let store = FaultyStore::new(MemoryStore::new());
    store.inject([Fault::Request, Fault::Request]).await;

    let pipeline = Pipeline::new(
        pipeline_config(1, 1),
        MemorySource::new(vec![
            entry(PEER_STATS_LINE, 1, utc(2020, 1, 2, 10, 1)),
            entry(UPLOAD_LINE, 2, utc(2020, 1, 2, 11, 1)),
        ]),
        store.clone(),
        GeoEnricher::new(sample_geo_lookup()),
    );

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 12, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.completed[0].window.start, utc(2020, 1, 2, 11, 0));
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].window.map(|window| window.start),
        Some(utc(2020, 1, 2, 10, 0))
    );
    assert_eq!(report.failures[0].error.kind(), ErrorKind::BulkWriteFailed);
    assert_eq!(store.inner().total_documents().await, 1);
}

#[tokio::test]
async fn empty_range_runs_nothing() {
    init_test_tracing();

    let store = MemoryStore::new();
    let pipeline = memory_pipeline(vec![], store.clone());

    let report = pipeline
        .run_range(utc(2020, 1, 2, 10, 0), utc(2020, 1, 2, 10, 0), Duration::minutes(60))
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(report.completed.is_empty());
    assert!(store.partitions().await.is_empty());
}
