//! End-to-end synchronous extraction against a mock Ads API

use serde_json::json;
use twitter_ads_analytics::extract::{ExtractError, ExtractExecutor, ExtractJob, FetchMode};
use twitter_ads_analytics::extract::window::split;
use twitter_ads_analytics::fetcher::{
    for_each_chunk, FetcherError, StatsFetcher, StatsQuery, SyncStatsFetcher,
};
use twitter_ads_analytics::output::{CsvRowSink, MemorySink};
use twitter_ads_analytics::schema::parse_columns;
use twitter_ads_analytics::{
    ColumnValue, Entity, EntityType, Granularity, MetricGroup, Placement,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{api_config, date, http_client, manual_clock, plain_transport};

fn executor(server: &MockServer) -> ExtractExecutor {
    ExtractExecutor::with_transport(plain_transport(), manual_clock(), api_config(server))
}

fn campaign_job(start: (i32, u32, u32), end: (i32, u32, u32), columns: &[&str]) -> ExtractJob {
    ExtractJob::new(
        "acc",
        EntityType::Campaign,
        vec![MetricGroup::Engagement],
        Granularity::Day,
        Placement::AllOnTwitter,
        date(start.0, start.1, start.2),
        date(end.0, end.1, end.2),
        chrono_tz::UTC,
        parse_columns(columns).unwrap(),
        FetchMode::Sync,
    )
}

async fn mount_campaigns(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/12/accounts/acc/campaigns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "c1", "name": "Spring"},
                {"id": "c2", "name": "Summer"}
            ],
            "next_cursor": null
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_two_day_window_yields_one_row_per_entity_day() {
    let server = MockServer::start().await;
    mount_campaigns(&server).await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .and(query_param("entity", "CAMPAIGN"))
        .and(query_param("entity_ids", "c1,c2"))
        .and(query_param("metric_groups", "ENGAGEMENT"))
        .and(query_param("granularity", "DAY"))
        .and(query_param("placement", "ALL_ON_TWITTER"))
        .and(query_param("start_time", "2020-01-01T00:00:00+0000"))
        .and(query_param("end_time", "2020-01-03T00:00:00+0000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "c1", "id_data": [{"metrics": {"impressions": [10, 20]}}]},
                {"id": "c2", "id_data": [{"metrics": {"impressions": null}}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let job = campaign_job(
        (2020, 1, 1),
        (2020, 1, 2),
        &["date:string", "id:string", "campaign_name:string", "impressions:long"],
    );
    let mut sink = MemorySink::new();
    let summary = executor(&server).execute(&job, &mut sink).await.unwrap();

    assert_eq!(summary.entities, 2);
    assert_eq!(summary.chunks, 1);
    assert_eq!(summary.records, 2);
    assert_eq!(summary.rows_emitted, 4);
    assert!(sink.is_finished());

    let rows = sink.rows();
    assert_eq!(
        rows[0],
        vec![
            ColumnValue::String("2020-01-01".into()),
            ColumnValue::String("c1".into()),
            ColumnValue::String("Spring".into()),
            ColumnValue::Long(10),
        ]
    );
    assert_eq!(rows[1][0], ColumnValue::String("2020-01-02".into()));
    assert_eq!(rows[1][3], ColumnValue::Long(20));
    assert_eq!(rows[2][1], ColumnValue::String("c2".into()));
    assert_eq!(rows[2][2], ColumnValue::String("Summer".into()));
    assert_eq!(rows[2][3], ColumnValue::Null);
    assert_eq!(rows[3][3], ColumnValue::Null);
}

#[tokio::test]
async fn test_long_range_is_split_into_weekly_windows() {
    let server = MockServer::start().await;
    mount_campaigns(&server).await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .and(query_param("start_time", "2020-01-01T00:00:00+0000"))
        .and(query_param("end_time", "2020-01-08T00:00:00+0000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "c1", "id_data": [{"metrics": {"impressions": [1, 1, 1, 1, 1, 1, 1]}}]},
                {"id": "c2", "id_data": [{"metrics": {"impressions": [2, 2, 2, 2, 2, 2, 2]}}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .and(query_param("start_time", "2020-01-08T00:00:00+0000"))
        .and(query_param("end_time", "2020-01-11T00:00:00+0000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "c1", "id_data": [{"metrics": {"impressions": [3, 3, 3]}}]},
                {"id": "c2", "id_data": [{"metrics": {"impressions": [4, 4, 4]}}]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let job = campaign_job((2020, 1, 1), (2020, 1, 10), &["date:string", "id:string", "impressions:long"]);
    let mut sink = MemorySink::new();
    let summary = executor(&server).execute(&job, &mut sink).await.unwrap();

    assert_eq!(summary.chunks, 2);
    assert_eq!(summary.rows_emitted, 20);
    let last = sink.rows().last().unwrap();
    assert_eq!(last[0], ColumnValue::String("2020-01-10".into()));
    assert_eq!(last[2], ColumnValue::Long(4));
}

#[tokio::test]
async fn test_batch_size_splits_entity_ids() {
    let server = MockServer::start().await;
    mount_campaigns(&server).await;
    for id in ["c1", "c2"] {
        Mock::given(method("GET"))
            .and(path("/12/stats/accounts/acc"))
            .and(query_param("entity_ids", id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": id, "id_data": [{"metrics": {"clicks": [5]}}]}]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let job = campaign_job((2020, 1, 1), (2020, 1, 1), &["id:string", "clicks:long"])
        .with_batch_size(1);
    let mut sink = MemorySink::new();
    let summary = executor(&server).execute(&job, &mut sink).await.unwrap();

    assert_eq!(summary.chunks, 2);
    assert_eq!(
        sink.rows().iter().map(|r| r[0].clone()).collect::<Vec<_>>(),
        vec![ColumnValue::String("c1".into()), ColumnValue::String("c2".into())]
    );
}

#[tokio::test]
async fn test_line_items_carry_parent_campaign() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12/accounts/acc/line_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "l1", "name": "Ad group", "campaign_id": "c9"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .and(query_param("entity", "LINE_ITEM"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "l1", "id_data": [{"metrics": {"billed_charge_local_micro": [1500000]}}]}]
        })))
        .mount(&server)
        .await;

    let mut job = campaign_job(
        (2020, 1, 1),
        (2020, 1, 1),
        &["line_item_id:string", "campaign_id:string", "line_item_name:string", "billed_charge_local_micro:long"],
    );
    job.entity_type = EntityType::LineItem;
    job.metric_groups = vec![MetricGroup::Billing];

    let mut sink = MemorySink::new();
    executor(&server).execute(&job, &mut sink).await.unwrap();

    assert_eq!(
        sink.rows()[0],
        vec![
            ColumnValue::String("l1".into()),
            ColumnValue::String("c9".into()),
            ColumnValue::String("Ad group".into()),
            ColumnValue::Long(1_500_000),
        ]
    );
}

#[tokio::test]
async fn test_rows_stream_into_csv() {
    let server = MockServer::start().await;
    mount_campaigns(&server).await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "c1", "id_data": [{"metrics": {"impressions": [7]}}]},
                {"id": "c2", "id_data": [{"metrics": {"impressions": [8]}}]}
            ]
        })))
        .mount(&server)
        .await;

    let job = campaign_job((2020, 1, 1), (2020, 1, 1), &["date:string", "id:string", "impressions:long"]);
    let mut sink = CsvRowSink::new(Vec::new(), job.columns.clone());
    executor(&server).execute(&job, &mut sink).await.unwrap();

    let csv = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(
        csv,
        "date,id,impressions\n2020-01-01,c1,7\n2020-01-01,c2,8\n"
    );
}

#[tokio::test]
async fn test_client_error_aborts_without_finishing_sink() {
    let server = MockServer::start().await;
    mount_campaigns(&server).await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad metric group"))
        .mount(&server)
        .await;

    let job = campaign_job((2020, 1, 1), (2020, 1, 1), &["id:string"]);
    let mut sink = MemorySink::new();
    let err = executor(&server).execute(&job, &mut sink).await.unwrap_err();

    assert!(matches!(
        err,
        ExtractError::Fetcher(FetcherError::Client { .. })
    ));
    assert!(!sink.is_finished());
    assert!(sink.rows().is_empty());
}

#[tokio::test]
async fn test_empty_stats_data_aborts_without_finishing_sink() {
    let server = MockServer::start().await;
    mount_campaigns(&server).await;
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let job = campaign_job((2020, 1, 1), (2020, 1, 2), &["id:string"]);
    let mut sink = MemorySink::new();
    let err = executor(&server).execute(&job, &mut sink).await.unwrap_err();

    assert!(matches!(err, ExtractError::Fetcher(FetcherError::Protocol(_))));
    assert!(!sink.is_finished());
    assert!(sink.rows().is_empty());
}

#[tokio::test]
async fn test_invalid_job_makes_no_requests() {
    let server = MockServer::start().await;

    let job = campaign_job((2020, 1, 5), (2020, 1, 1), &["id:string"]);
    let mut sink = MemorySink::new();
    let err = executor(&server).execute(&job, &mut sink).await.unwrap_err();

    assert!(matches!(err, ExtractError::Validation(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_account_without_entities_emits_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12/accounts/acc/campaigns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let job = campaign_job((2020, 1, 1), (2020, 1, 3), &["id:string"]);
    let mut sink = MemorySink::new();
    let summary = executor(&server).execute(&job, &mut sink).await.unwrap();

    assert_eq!(summary.chunks, 0);
    assert_eq!(summary.rows_emitted, 0);
    assert!(sink.is_finished());
}

fn campaign_query() -> StatsQuery {
    StatsQuery {
        account_id: "acc".to_string(),
        entity_type: EntityType::Campaign,
        metric_groups: vec![MetricGroup::Engagement],
        granularity: Granularity::Day,
        placement: Placement::AllOnTwitter,
    }
}

async fn mount_batch_stats(server: &MockServer, ids: &[&str]) {
    let data: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "id_data": [{"metrics": {"impressions": [1]}}]}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/12/stats/accounts/acc"))
        .and(query_param("entity_ids", ids.join(",")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_walks_batches_then_windows() {
    let server = MockServer::start().await;
    mount_batch_stats(&server, &["c1", "c2"]).await;
    mount_batch_stats(&server, &["c3"]).await;

    let fetcher =
        SyncStatsFetcher::new(http_client(manual_clock()), api_config(&server)).with_batch_size(2);
    let entities = vec![Entity::new("c1"), Entity::new("c2"), Entity::new("c3")];
    let windows = split(date(2020, 1, 1), date(2020, 1, 10), 7, chrono_tz::UTC).unwrap();
    let records = fetcher
        .fetch(&campaign_query(), &entities, &windows)
        .await
        .unwrap();

    let order: Vec<(String, u32)> = records
        .iter()
        .map(|r| (r.entity_id.clone(), chrono::Datelike::day(&r.start_date)))
        .collect();
    assert_eq!(
        order,
        vec![
            ("c1".to_string(), 1),
            ("c2".to_string(), 1),
            ("c1".to_string(), 8),
            ("c2".to_string(), 8),
            ("c3".to_string(), 1),
            ("c3".to_string(), 8),
        ]
    );
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_chunk_handler_error_stops_fetching() {
    let server = MockServer::start().await;
    mount_batch_stats(&server, &["c1"]).await;
    mount_batch_stats(&server, &["c2"]).await;

    let fetcher =
        SyncStatsFetcher::new(http_client(manual_clock()), api_config(&server)).with_batch_size(1);
    let entities = vec![Entity::new("c1"), Entity::new("c2")];
    let windows = split(date(2020, 1, 1), date(2020, 1, 2), 7, chrono_tz::UTC).unwrap();

    let mut seen = 0;
    let err = for_each_chunk(&fetcher, &campaign_query(), &entities, &windows, |records| {
        seen += records.len();
        Err(FetcherError::InvalidArgument("sink full".into()))
    })
    .await
    .unwrap_err();

    assert!(matches!(err, FetcherError::InvalidArgument(_)));
    assert_eq!(seen, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
