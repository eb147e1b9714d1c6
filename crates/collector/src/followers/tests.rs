//! End-to-end tests for the collection pipeline against a mock provider

use super::*;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, Request, Respond, ResponseTemplate,
};

const IDS_PATH: &str = "/1.1/followers/ids.json";
const LOOKUP_PATH: &str = "/1.1/users/lookup.json";
const SHOW_PATH: &str = "/1.1/users/show.json";

/// Helper struct to capture progress events during testing
#[derive(Debug, Default)]
struct ProgressCapture {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl ProgressCapture {
    fn new() -> Self {
        Self::default()
    }

    fn get_callback(&self) -> ProgressCallback {
        let events = self.events.clone();
        Arc::new(move |event| {
            events.lock().unwrap().push(event);
        })
    }

    fn get_events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    fn count_events_of_type(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| match event {
                ProgressEvent::CountEstimated { .. } => event_type == "count_estimated",
                ProgressEvent::PageFetched { .. } => event_type == "page_fetched",
                ProgressEvent::ListingComplete { .. } => event_type == "listing_complete",
                ProgressEvent::ChunkProcessed { .. } => event_type == "chunk_processed",
                ProgressEvent::ChunkSkipped { .. } => event_type == "chunk_skipped",
                ProgressEvent::ChunkFailed { .. } => event_type == "chunk_failed",
                ProgressEvent::RateLimited { .. } => event_type == "rate_limited",
                ProgressEvent::RetryAttempt { .. } => event_type == "retry_attempt",
                ProgressEvent::EnrichmentComplete { .. } => event_type == "enrichment_complete",
                ProgressEvent::Warning { .. } => event_type == "warning",
            })
            .count()
    }
}

/// Serves the batch lookup endpoint from a fixed set of live accounts
struct LookupResponder {
    live: BTreeSet<u64>,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl LookupResponder {
    fn new(live: &[u64]) -> Self {
        Self {
            live: live.iter().copied().collect(),
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

impl Respond for LookupResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return ResponseTemplate::new(500).set_body_string("{\"errors\":[{\"code\":131}]}");
        }

        let requested = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "user_id")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        let users: Vec<serde_json::Value> = requested
            .split(',')
            .filter_map(|id| id.parse::<u64>().ok())
            .filter(|id| self.live.contains(id))
            .map(|id| serde_json::json!({
                "id": id,
                "id_str": id.to_string(),
                "screen_name": format!("follower{}", id),
                "name": format!("Follower {}", id),
                "followers_count": id * 100,
                "created_at": "Wed Oct 10 20:19:24 +0000 2018"
            }))
            .collect();
        ResponseTemplate::new(200).set_body_json(users)
    }
}

async fn mount_listing(server: &MockServer, pages: &[(&str, &[u64], i64)]) {
    for (cursor, ids, next_cursor) in pages {
        Mock::given(method("GET"))
            .and(path(IDS_PATH))
            .and(query_param("cursor", *cursor))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ids": ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
                "next_cursor": next_cursor,
            })))
            .mount(server)
            .await;
    }
}

async fn mount_count(server: &MockServer, count: u64) {
    Mock::given(method("GET"))
        .and(path(SHOW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "screen_name": "rustlang",
            "followers_count": count,
        })))
        .mount(server)
        .await;
}

/// Five followers over two pages, all live
async fn mount_provider(server: &MockServer, lookups: LookupResponder) {
    mount_count(server, 5).await;
    mount_listing(server, &[("-1", &[1, 2, 3][..], 100), ("100", &[4, 5][..], 0)]).await;
    Mock::given(method("GET"))
        .and(path(LOOKUP_PATH))
        .respond_with(lookups)
        .mount(server)
        .await;
}

fn pipeline_for(server: &MockServer, data_dir: &Path) -> FollowerPipeline {
    // Another test may have installed it already
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let config = CollectorConfig::new("test-token")
        .with_api_base(server.uri())
        .with_lookup_chunk_size(2)
        .with_transport_retries(1, Duration::ZERO)
        .with_rate_limit_waits(Duration::ZERO, Duration::ZERO, Duration::ZERO);
    FollowerPipeline::from_config(config, data_dir).unwrap()
}

/// Stored rows without the resolution timestamp, which differs between runs
async fn stored_rows(pipeline: &FollowerPipeline) -> Vec<(String, String, u64)> {
    pipeline
        .store_for("rustlang")
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.id.to_string(), r.screen_name, r.followers_count))
        .collect()
}

async fn lookup_batches(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == LOOKUP_PATH)
        .filter_map(|request| {
            request
                .url
                .query_pairs()
                .find(|(key, _)| key == "user_id")
                .map(|(_, value)| value.into_owned())
        })
        .collect()
}

#[tokio::test]
async fn test_full_run_stores_every_follower() {
    let server = MockServer::start().await;
    mount_provider(&server, LookupResponder::new(&[1, 2, 3, 4, 5])).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline_for(&server, dir.path());

    let summary = pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    assert!(summary.fetched);
    assert_eq!(summary.new_ids, 5);
    assert_eq!(summary.written(), 5);
    assert_eq!(summary.stored, 5);
    assert_eq!(summary.run.pages, 2);
    assert_eq!(summary.run.chunks_total, 3);
    assert_eq!(summary.run.enrichment_percent(), 100.0);
    assert_eq!(lookup_batches(&server).await, vec!["1,2", "3,4", "5"]);

    let rows = stored_rows(&pipeline).await;
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], ("1".to_string(), "follower1".to_string(), 100));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_provider(&server, LookupResponder::new(&[1, 2, 3, 4, 5])).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline_for(&server, dir.path());

    pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();
    let after_first = stored_rows(&pipeline).await;
    let lookups_after_first = lookup_batches(&server).await.len();

    let summary = pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    assert_eq!(summary.new_ids, 0);
    assert_eq!(summary.written(), 0);
    assert_eq!(stored_rows(&pipeline).await, after_first);
    // Nothing left to resolve, so no lookup was issued
    assert_eq!(lookup_batches(&server).await.len(), lookups_after_first);
}

#[tokio::test]
async fn test_interrupted_run_resumes_to_same_store() {
    // Uninterrupted reference run
    let reference_server = MockServer::start().await;
    mount_provider(&reference_server, LookupResponder::new(&[1, 2, 3, 4, 5])).await;
    let reference_dir = tempdir().unwrap();
    let reference = pipeline_for(&reference_server, reference_dir.path());
    reference.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    // Second chunk hits a server error and aborts the run
    let server = MockServer::start().await;
    mount_provider(&server, LookupResponder::new(&[1, 2, 3, 4, 5]).failing_on_call(2)).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline_for(&server, dir.path());

    let err = pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap_err();
    assert_eq!(err.to_string(), "Follower detail lookup failed for ids 3..4");
    assert!(matches!(err.root(), CollectorError::Api { status: 500, .. }));
    assert_eq!(stored_rows(&pipeline).await.len(), 2);

    // Restart against a healthy provider
    server.reset().await;
    mount_provider(&server, LookupResponder::new(&[1, 2, 3, 4, 5])).await;
    let summary = pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    assert_eq!(summary.new_ids, 3);
    assert_eq!(lookup_batches(&server).await, vec!["3,4", "5"]);
    assert_eq!(stored_rows(&pipeline).await, stored_rows(&reference).await);
}

#[tokio::test]
async fn test_overlapping_pages_store_each_follower_once() {
    let server = MockServer::start().await;
    mount_count(&server, 4).await;
    // 3 appears on both pages, 6 is a deleted account the lookup never returns
    mount_listing(&server, &[("-1", &[1, 2, 3][..], 7), ("7", &[3, 4, 6, 1][..], 0)]).await;
    Mock::given(method("GET"))
        .and(path(LOOKUP_PATH))
        .respond_with(LookupResponder::new(&[1, 2, 3, 4]))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline_for(&server, dir.path());

    let summary = pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    assert_eq!(summary.run.retrieved, 7);
    assert_eq!(summary.new_ids, 5);
    assert_eq!(summary.written(), 4);
    assert_eq!(summary.enrichment.as_ref().unwrap().not_returned, 1);

    let ids: Vec<String> = stored_rows(&pipeline).await.into_iter().map(|row| row.0).collect();
    let unique: BTreeSet<&String> = ids.iter().collect();
    assert_eq!(ids.len(), unique.len());
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_rate_limited_listing_is_retried() {
    let server = MockServer::start().await;
    mount_count(&server, 1).await;
    Mock::given(method("GET"))
        .and(path(IDS_PATH))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("x-rate-limit-remaining", "0")
                .insert_header("x-rate-limit-reset", "0"),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_listing(&server, &[("-1", &[1][..], 0)]).await;
    Mock::given(method("GET"))
        .and(path(LOOKUP_PATH))
        .respond_with(LookupResponder::new(&[1]))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let capture = ProgressCapture::new();
    let pipeline = pipeline_for(&server, dir.path()).with_progress(Some(capture.get_callback()));

    let summary = pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    assert_eq!(summary.written(), 1);
    assert_eq!(capture.count_events_of_type("rate_limited"), 1);
    let metrics = pipeline.metrics();
    assert_eq!(metrics.rate_limit_waits, 1);
    // count, rate-limited listing, listing, lookup
    assert_eq!(metrics.requests_sent, 4);
}

#[tokio::test]
async fn test_unauthorized_listing_aborts_run() {
    let server = MockServer::start().await;
    mount_count(&server, 3).await;
    Mock::given(method("GET"))
        .and(path(IDS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"errors\":[{\"code\":89}]}"))
        .mount(&server)
        .await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline_for(&server, dir.path());

    let err = pipeline.run("@rustlang", RunMode::FetchAndMerge).await.unwrap_err();

    assert_eq!(err.to_string(), "Follower listing failed for @rustlang");
    assert!(!err.is_recoverable());
    let report = err.detailed_report();
    assert!(report.contains("HTTP 401"));
    assert!(report.contains("bearer token"));
    assert!(!pipeline.store_for("rustlang").exists().await.unwrap());
}

#[tokio::test]
async fn test_progress_events_for_full_run() {
    let server = MockServer::start().await;
    mount_provider(&server, LookupResponder::new(&[1, 2, 3, 4, 5])).await;
    let dir = tempdir().unwrap();
    let capture = ProgressCapture::new();
    let pipeline = pipeline_for(&server, dir.path()).with_progress(Some(capture.get_callback()));

    pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    assert_eq!(capture.count_events_of_type("count_estimated"), 1);
    assert_eq!(capture.count_events_of_type("page_fetched"), 2);
    assert_eq!(capture.count_events_of_type("listing_complete"), 1);
    assert_eq!(capture.count_events_of_type("chunk_processed"), 3);
    assert_eq!(capture.count_events_of_type("enrichment_complete"), 1);
    assert_eq!(capture.count_events_of_type("warning"), 0);

    let events = capture.get_events();
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::EnrichmentComplete { written: 5, unresolved: 0 })
    );
    let chunks: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::ChunkProcessed { chunk, total_chunks, .. } => Some((*chunk, *total_chunks)),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn test_report_after_run() {
    let server = MockServer::start().await;
    mount_provider(&server, LookupResponder::new(&[1, 2, 3, 4, 5])).await;
    let dir = tempdir().unwrap();
    let pipeline = pipeline_for(&server, dir.path());
    pipeline.run("rustlang", RunMode::FetchAndMerge).await.unwrap();

    let options = ReportOptions { top_n: 2, ..ReportOptions::default() };
    let report = pipeline.report("rustlang", &options).await.unwrap();

    let names: Vec<&str> = report.rows().iter().map(|r| r.screen_name.as_str()).collect();
    assert_eq!(names, vec!["follower5", "follower4"]);
    let rendered = report.render();
    assert!(rendered.starts_with("Top 2 Accounts Following @rustlang\n(Ranked by Followers Count)"));
    assert!(rendered.contains("| 1 | follower5"));
    assert!(rendered.contains("Wed Oct 10, 2018"));
}
