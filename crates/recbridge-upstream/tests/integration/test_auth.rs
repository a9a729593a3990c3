//! Authentication behavior of the RPC client
//!
//! - Successful session establishment
//! - Credential rejection
//! - Single-flight: concurrent callers share one authentication

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recbridge_core::domain::errors::UpstreamError;
use recbridge_core::ports::upstream::IUpstreamClient;

use crate::common;

#[tokio::test]
async fn test_authenticate_establishes_session() {
    let server = MockServer::start().await;
    common::mount_authenticate(&server).await;
    let client = common::client_for(&server);

    let session = client.authenticate().await.expect("authentication failed");
    assert_eq!(session.uid.value(), 2);
    assert_eq!(session.session_id, "sess-1");
}

#[tokio::test]
async fn test_authenticate_sends_credentials() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .and(body_partial_json(json!({
            "params": {"db": "testdb", "login": "svc", "password": "pw"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "session_id=sess-9; Path=/")
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"uid": 5}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let session = client.authenticate().await.unwrap();
    assert_eq!(session.uid.value(), 5);
}

#[tokio::test]
async fn test_bad_credentials_surface_auth_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": 200, "message": "Access Denied"}
        })))
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    let err = client.authenticate().await.unwrap_err();
    assert!(matches!(err, UpstreamError::AuthFailed { .. }));
}

#[tokio::test]
async fn test_missing_uid_is_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"uid": null}})),
        )
        .mount(&server)
        .await;

    let client = common::client_for(&server);
    assert!(matches!(
        client.authenticate().await.unwrap_err(),
        UpstreamError::AuthFailed { .. }
    ));
}

#[tokio::test]
async fn test_concurrent_authentication_is_single_flight() {
    let server = MockServer::start().await;

    // Exactly one authentication round trip for many concurrent callers.
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "session_id=sess-sf; Path=/")
                .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": {"uid": 2}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(common::client_for(&server));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.authenticate().await })
        })
        .collect();

    for handle in handles {
        let session = handle.await.unwrap().expect("authentication failed");
        assert_eq!(session.session_id, "sess-sf");
    }
}
