//! Async stats jobs: submit, poll, download
//!
//! Polls and download retries sleep on a manual clock, so poll ceilings are
//! exercised at full size.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use twitter_ads_analytics::extract::{ExtractExecutor, ExtractJob, FetchMode, TimeWindow};
use twitter_ads_analytics::fetcher::async_job::JobState;
use twitter_ads_analytics::fetcher::job_result::JobResultDownloader;
use twitter_ads_analytics::fetcher::{
    AsyncJobOrchestrator, FetcherError, StatsFetcher, StatsQuery,
};
use twitter_ads_analytics::output::MemorySink;
use twitter_ads_analytics::schema::parse_columns;
use twitter_ads_analytics::{
    ColumnValue, Entity, EntityType, Granularity, MetricGroup, Placement,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{api_config, date, gzip_json, http_client, manual_clock, plain_transport};

const JOBS: &str = "/12/stats/jobs/accounts/acc";
const RESULT: &str = "/results/j1.json.gz";

fn query() -> StatsQuery {
    StatsQuery {
        account_id: "acc".to_string(),
        entity_type: EntityType::LineItem,
        metric_groups: vec![MetricGroup::Engagement],
        granularity: Granularity::Day,
        placement: Placement::AllOnTwitter,
    }
}

fn window() -> TimeWindow {
    TimeWindow::new(date(2020, 1, 1), date(2020, 1, 2), chrono_tz::UTC).unwrap()
}

fn result_payload() -> Value {
    json!({
        "data": [
            {"id": "l1", "id_data": [{"metrics": {"impressions": [3, 4]}}]}
        ]
    })
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(JOBS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id_str": "j1", "status": "QUEUED"}
        })))
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, status: &str, url: Option<String>, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(JOBS))
        .and(query_param("job_ids", "j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id_str": "j1", "status": status, "url": url}]
        })));
    let mock = match times {
        Some(n) => mock.up_to_n_times(n),
        None => mock,
    };
    mock.mount(server).await;
}

async fn mount_result(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(RESULT))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_json(&result_payload())))
        .mount(server)
        .await;
}

async fn count_requests(server: &MockServer, verb: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == verb && r.url.path() == route)
        .count()
}

async fn count_polls(server: &MockServer) -> usize {
    count_requests(server, "GET", JOBS).await
}

#[tokio::test]
async fn test_job_runs_through_queued_processing_success() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_status(&server, "QUEUED", None, Some(1)).await;
    mount_status(&server, "PROCESSING", None, Some(1)).await;
    mount_status(&server, "SUCCESS", Some(format!("{}{RESULT}", server.uri())), None).await;
    mount_result(&server).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let batch = vec![Entity::new("l1").with_campaign_id("c1")];
    let records = orchestrator
        .fetch_chunk(&query(), &batch, &window())
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].entity_id, "l1");
    assert_eq!(records[0].campaign_id.as_deref(), Some("c1"));
    assert_eq!(records[0].start_date, date(2020, 1, 1));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 2]);
    assert_eq!(count_polls(&server).await, 3);
}

#[tokio::test]
async fn test_submit_sends_stats_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(JOBS))
        .and(query_param("entity", "LINE_ITEM"))
        .and(query_param("entity_ids", "l1,l2"))
        .and(query_param("start_time", "2020-01-01T00:00:00+0000"))
        .and(query_param("end_time", "2020-01-03T00:00:00+0000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 77}})))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = AsyncJobOrchestrator::new(http_client(manual_clock()), api_config(&server));
    let batch = vec![Entity::new("l1"), Entity::new("l2")];
    let job = orchestrator.submit(&query(), &batch, &window()).await.unwrap();

    assert_eq!(job.id, "77");
    assert_eq!(job.state, JobState::Queued);
    assert_eq!(job.status_poll_count, 0);
}

#[tokio::test]
async fn test_failed_job_stops_polling() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_status(&server, "QUEUED", None, Some(1)).await;
    mount_status(&server, "FAILED", None, None).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let err = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap_err();

    match err {
        FetcherError::JobFailed { job_id } => assert_eq!(job_id, "j1"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(clock.sleep_count(), 1);
    assert_eq!(count_polls(&server).await, 2);
}

#[tokio::test]
async fn test_job_times_out_after_sixty_polls() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_status(&server, "PROCESSING", None, None).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let err = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Timeout(_)));
    assert_eq!(count_polls(&server).await, 60);
    assert_eq!(clock.sleep_count(), 59);
    assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(10)));
}

#[tokio::test]
async fn test_success_without_url_is_protocol_error() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_status(&server, "SUCCESS", None, None).await;

    let orchestrator = AsyncJobOrchestrator::new(http_client(manual_clock()), api_config(&server));
    let err = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Protocol(_)));
}

#[tokio::test]
async fn test_rate_limited_submit_is_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(JOBS))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_submit(&server).await;
    mount_status(&server, "SUCCESS", Some(format!("{}{RESULT}", server.uri())), None).await;
    mount_result(&server).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let records = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    assert_eq!(count_requests(&server, "POST", JOBS).await, 2);
    assert_eq!(count_polls(&server).await, 1);
    assert_eq!(count_requests(&server, "GET", RESULT).await, 1);
}

#[tokio::test]
async fn test_unavailable_poll_is_retried_and_polling_continues() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_status(&server, "QUEUED", None, Some(1)).await;
    Mock::given(method("GET"))
        .and(path(JOBS))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_status(&server, "SUCCESS", Some(format!("{}{RESULT}", server.uri())), None).await;
    mount_result(&server).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let records = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(
        clock.sleeps(),
        vec![Duration::from_secs(10), Duration::from_secs(1)]
    );
    assert_eq!(count_polls(&server).await, 3);
    assert_eq!(count_requests(&server, "POST", JOBS).await, 1);
}

#[tokio::test]
async fn test_unknown_job_status_stops_before_download() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_status(&server, "EXPLODED", None, None).await;
    mount_result(&server).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let err = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Protocol(_)));
    assert_eq!(count_polls(&server).await, 1);
    assert_eq!(count_requests(&server, "GET", RESULT).await, 0);
    assert_eq!(clock.sleep_count(), 0);
}

#[tokio::test]
async fn test_submit_without_job_id_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(JOBS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"status": "QUEUED"}})))
        .mount(&server)
        .await;
    mount_status(&server, "SUCCESS", Some(format!("{}{RESULT}", server.uri())), None).await;
    mount_result(&server).await;

    let clock = manual_clock();
    let orchestrator = AsyncJobOrchestrator::new(http_client(clock.clone()), api_config(&server));
    let err = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &window())
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Protocol(_)));
    assert_eq!(count_requests(&server, "POST", JOBS).await, 1);
    assert_eq!(count_polls(&server).await, 0);
    assert_eq!(count_requests(&server, "GET", RESULT).await, 0);
    assert_eq!(clock.sleep_count(), 0);
}

#[tokio::test]
async fn test_chunk_limits_are_checked_before_submitting() {
    let server = MockServer::start().await;
    let orchestrator = AsyncJobOrchestrator::new(http_client(manual_clock()), api_config(&server));
    let too_long = TimeWindow::new(date(2020, 1, 1), date(2020, 4, 30), chrono_tz::UTC).unwrap();

    let err = orchestrator
        .fetch_chunk(&query(), &[Entity::new("l1")], &too_long)
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::InvalidArgument(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_retries_until_payload_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RESULT))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(RESULT))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": []}"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_result(&server).await;

    let clock = manual_clock();
    let downloader = JobResultDownloader::with_client(Arc::new(reqwest::Client::new()), clock.clone());
    let items = downloader
        .download(&format!("{}{RESULT}", server.uri()))
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3)
        ]
    );
}

#[tokio::test]
async fn test_download_gives_up_after_five_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RESULT))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let clock = manual_clock();
    let downloader = JobResultDownloader::with_client(Arc::new(reqwest::Client::new()), clock.clone());
    let err = downloader
        .download(&format!("{}{RESULT}", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Download(_)));
    assert_eq!(clock.sleep_count(), 5);
    assert_eq!(server.received_requests().await.unwrap().len(), 6);
}

#[tokio::test]
async fn test_executor_runs_async_mode_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12/accounts/acc/line_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "l1", "name": "Retargeting", "campaign_id": "c1"}]
        })))
        .mount(&server)
        .await;
    mount_submit(&server).await;
    mount_status(&server, "SUCCESS", Some(format!("{}{RESULT}", server.uri())), None).await;
    mount_result(&server).await;

    let job = ExtractJob::new(
        "acc",
        EntityType::LineItem,
        vec![MetricGroup::Engagement],
        Granularity::Day,
        Placement::AllOnTwitter,
        date(2020, 1, 1),
        date(2020, 1, 2),
        chrono_tz::UTC,
        parse_columns(["date:string", "campaign_id:string", "name:string", "impressions:long"])
            .unwrap(),
        FetchMode::Async,
    );
    let executor =
        ExtractExecutor::with_transport(plain_transport(), manual_clock(), api_config(&server));
    let mut sink = MemorySink::new();
    let summary = executor.execute(&job, &mut sink).await.unwrap();

    assert_eq!(summary.mode, FetchMode::Async);
    assert_eq!(summary.rows_emitted, 2);
    assert_eq!(
        sink.rows()[1],
        vec![
            ColumnValue::String("2020-01-02".into()),
            ColumnValue::String("c1".into()),
            ColumnValue::String("Retargeting".into()),
            ColumnValue::Long(4),
        ]
    );
}
