//! Shared fixtures for the upstream integration tests

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use recbridge_core::domain::tenant::UpstreamCredentials;
use recbridge_upstream::{RpcClient, UpstreamClientConfig};

/// Build a client pointed at the mock server, with fast retry timings
pub fn client_for(server: &MockServer) -> RpcClient {
    let credentials = UpstreamCredentials {
        url: server.uri(),
        database: "testdb".to_string(),
        login: "svc".to_string(),
        secret: "pw".to_string(),
    };
    let mut config = UpstreamClientConfig::new(credentials);
    config.auth_timeout = Duration::from_secs(2);
    config.read_timeout = Duration::from_secs(2);
    config.write_timeout = Duration::from_secs(2);
    config.initial_backoff = Duration::from_millis(10);
    RpcClient::new(config)
}

/// Mount a successful `/authenticate` endpoint issuing `session_id=sess-1`
pub async fn mount_authenticate(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/authenticate"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "session_id=sess-1; Path=/")
                .set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {"uid": 2, "user_context": {"lang": "en_US"}}
                })),
        )
        .mount(server)
        .await;
}
