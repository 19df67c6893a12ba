//! Cursor pagination through the entity pager and the generic `paginate`

use serde_json::json;
use std::time::Duration;
use twitter_ads_analytics::fetcher::pagination::paginate;
use twitter_ads_analytics::fetcher::{EntityPager, FetcherError};
use twitter_ads_analytics::EntityType;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{api_config, http_client, manual_clock};

const LINE_ITEMS: &str = "/12/accounts/acc/line_items";

async fn mount_page(server: &MockServer, cursor: Option<&str>, body: serde_json::Value) {
    let builder = Mock::given(method("GET")).and(path(LINE_ITEMS));
    let response = ResponseTemplate::new(200).set_body_json(body);
    let mock = match cursor {
        // Cursor pages outrank the first-page mock, which matches any query
        Some(cursor) => builder
            .and(query_param("cursor", cursor))
            .respond_with(response)
            .with_priority(1),
        None => builder.respond_with(response).with_priority(5),
    };
    mock.mount(server).await;
}

#[tokio::test]
async fn test_three_pages_are_concatenated_in_order() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        None,
        json!({
            "data": [
                {"id": "l1", "name": "first", "campaign_id": "c1"},
                {"id": "l2", "name": "second", "campaign_id": "c1"}
            ],
            "next_cursor": "page2"
        }),
    )
    .await;
    mount_page(
        &server,
        Some("page2"),
        json!({"data": [{"id": "l3", "campaign_id": "c2"}], "next_cursor": "page3"}),
    )
    .await;
    mount_page(
        &server,
        Some("page3"),
        json!({"data": [{"id": "l4", "campaign_id": "c2"}], "next_cursor": null}),
    )
    .await;

    let pager = EntityPager::new(http_client(manual_clock()), api_config(&server));
    let entities = pager
        .fetch_all(EntityType::LineItem, "acc", 1000)
        .await
        .unwrap();

    let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["l1", "l2", "l3", "l4"]);
    assert_eq!(entities[0].name.as_deref(), Some("first"));
    assert_eq!(entities[2].campaign_id.as_deref(), Some("c2"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].url.query().unwrap_or("").contains("count=1000"));
}

#[tokio::test]
async fn test_single_page_listing() {
    let server = MockServer::start().await;
    mount_page(&server, None, json!({"data": [{"id": "l1"}]})).await;

    let pager = EntityPager::new(http_client(manual_clock()), api_config(&server));
    let entities = pager.fetch_all(EntityType::LineItem, "acc", 0).await.unwrap();

    assert_eq!(entities.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_numeric_ids_are_normalized() {
    let server = MockServer::start().await;
    mount_page(&server, None, json!({"data": [{"id": 12345, "name": "numeric"}]})).await;

    let pager = EntityPager::new(http_client(manual_clock()), api_config(&server));
    let entities = pager.fetch_all(EntityType::LineItem, "acc", 10).await.unwrap();

    assert_eq!(entities[0].id, "12345");
}

#[tokio::test]
async fn test_account_entity_is_the_account_resource() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/12/accounts/acc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"id": "acc", "name": "Main account"}})),
        )
        .mount(&server)
        .await;

    let pager = EntityPager::new(http_client(manual_clock()), api_config(&server));
    let entities = pager.fetch_all(EntityType::Account, "acc", 1000).await.unwrap();

    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].name.as_deref(), Some("Main account"));
}

#[tokio::test]
async fn test_page_retry_resumes_at_same_cursor() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        None,
        json!({"data": [{"id": "l1"}], "next_cursor": "page2"}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path(LINE_ITEMS))
        .and(query_param("cursor", "page2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_page(&server, Some("page2"), json!({"data": [{"id": "l2"}]})).await;

    let clock = manual_clock();
    let pager = EntityPager::new(http_client(clock.clone()), api_config(&server));
    let entities = pager.fetch_all(EntityType::LineItem, "acc", 1000).await.unwrap();

    assert_eq!(entities.len(), 2);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn test_page_without_data_is_protocol_error() {
    let server = MockServer::start().await;
    mount_page(&server, None, json!({"errors": [{"code": "X"}]})).await;

    let client = http_client(manual_clock());
    let err = paginate(&client, &format!("{}{LINE_ITEMS}", server.uri()), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, FetcherError::Protocol(_)));
}

#[tokio::test]
async fn test_not_found_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LINE_ITEMS))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let pager = EntityPager::new(http_client(manual_clock()), api_config(&server));
    let err = pager
        .fetch_all(EntityType::LineItem, "acc", 1000)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
}
