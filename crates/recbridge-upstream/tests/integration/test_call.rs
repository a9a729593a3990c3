//! RPC execution behavior
//!
//! - Context injection without overwriting caller keys
//! - Transparent session-expiry retry (exactly once)
//! - Typed error classification through the transport

use serde_json::{json, Map};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recbridge_core::domain::errors::UpstreamError;
use recbridge_core::ports::upstream::IUpstreamClient;

use crate::common;

#[tokio::test]
async fn test_call_returns_result_and_injects_context() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .and(body_partial_json(json!({
            "params": {
                "model": "res.partner",
                "method": "search_read",
                "kwargs": {"context": {"lang": "en_US", "tz": "UTC", "uid": 2}}
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": [{"id": 1, "name": "Azure Interior"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let result = client
        .call("res.partner", "search_read", Vec::new(), Map::new())
        .await
        .expect("call failed");

    assert_eq!(result[0]["name"], json!("Azure Interior"));
}

#[tokio::test]
async fn test_call_authenticates_lazily() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": 3})),
        )
        .mount(&server)
        .await;

    // No explicit authenticate(): the first call must establish the session.
    let client = common::client_for(&server);
    let result = client
        .call("res.partner", "search_count", Vec::new(), Map::new())
        .await
        .unwrap();
    assert_eq!(result, json!(3));
}

#[tokio::test]
async fn test_session_expiry_retries_exactly_once() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    // First execution: session-expired sentinel. Mounted first so it wins
    // once, then stops matching.
    Mock::given(method("POST"))
        .and(path("/call_method"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 100, "message": "Session expired"}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Retry after re-authentication succeeds.
    Mock::given(method("POST"))
        .and(path("/call_method"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": [7]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let result = client
        .call("res.partner", "search", Vec::new(), Map::new())
        .await
        .expect("retry after session expiry failed");
    assert_eq!(result, json!([7]));
}

#[tokio::test]
async fn test_persistent_session_expiry_surfaces_error() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    // Every execution reports an expired session; after one retry the
    // error must surface instead of looping.
    Mock::given(method("POST"))
        .and(path("/call_method"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 100, "message": "Session expired"}
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let err = client
        .call("res.partner", "search", Vec::new(), Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::SessionExpired));
}

#[tokio::test]
async fn test_permission_denied_is_classified() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": 200,
                "message": "Upstream Server Error",
                "data": {"message": "You are not allowed to access this. Permission denied."}
            }
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let err = client
        .call("account.move", "unlink", vec![json!([9])], Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_http_error_maps_to_connection() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;

    Mock::given(method("POST"))
        .and(path("/call_method"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let err = client
        .call("res.partner", "search", Vec::new(), Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Connection(_)));
}
