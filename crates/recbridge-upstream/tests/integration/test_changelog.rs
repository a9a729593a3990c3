//! Change-log reader behavior against a stubbed upstream

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recbridge_core::domain::change_event::EventKind;
use recbridge_core::domain::newtypes::EventId;
use recbridge_core::ports::change_log::{ChangeLogQuery, IChangeLogReader};
use recbridge_upstream::ChangeLogReader;

use crate::common;

#[tokio::test]
async fn test_fetch_maps_rows_to_events() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .and(body_partial_json(json!({
            "params": {"model": "change.log", "method": "search_read"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [
                {
                    "id": 101,
                    "model": "sale.order",
                    "record_id": 11,
                    "event": "create",
                    "timestamp": "2024-03-01 10:00:00",
                    "priority": "high",
                    "payload": false,
                    "changed_fields": false,
                    "category": false
                },
                {
                    "id": 102,
                    "model": "res.partner",
                    "record_id": 5,
                    "event": "write",
                    "timestamp": "2024-03-01 10:01:00",
                    "changed_fields": ["name"]
                }
            ]
        })))
        .mount(&server)
        .await;

    let client = Arc::new(common::client_for(&server));
    let reader = ChangeLogReader::new(client);

    let events = reader
        .fetch(&ChangeLogQuery::after(EventId::new(100)))
        .await
        .expect("fetch failed");

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_id, EventId::new(101));
    assert_eq!(events[0].kind, EventKind::Create);
    assert!(events[0].payload.is_none());
    assert_eq!(events[1].kind, EventKind::Update);
    assert_eq!(
        events[1].changed_fields.as_deref(),
        Some(&["name".to_string()][..])
    );
}

#[tokio::test]
async fn test_count_uses_search_count() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .and(body_partial_json(json!({
            "params": {"model": "change.log", "method": "search_count"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": 41})),
        )
        .mount(&server)
        .await;

    let client = Arc::new(common::client_for(&server));
    let reader = ChangeLogReader::new(client);

    let count = reader
        .count(&ChangeLogQuery::after(EventId::ZERO))
        .await
        .unwrap();
    assert_eq!(count, 41);
}

#[tokio::test]
async fn test_acknowledge_skips_empty_batches() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would fail the test.
    let client = Arc::new(common::client_for(&server));
    let reader = ChangeLogReader::new(client);

    reader.acknowledge(&[]).await.expect("empty ack must be a no-op");
}

#[tokio::test]
async fn test_acknowledge_posts_event_ids() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .and(body_partial_json(json!({
            "params": {"model": "change.log", "method": "acknowledge", "args": [[101, 102]]}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(common::client_for(&server));
    let reader = ChangeLogReader::new(client);

    reader
        .acknowledge(&[EventId::new(101), EventId::new(102)])
        .await
        .expect("acknowledge failed");
}
