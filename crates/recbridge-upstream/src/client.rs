//! JSON-RPC client for the upstream record backend
//!
//! Speaks the upstream's two endpoints - `/authenticate` and `/call_method` -
//! carrying a session cookie. One instance binds to a single
//! (URL, database, login, secret) tuple, typically one per tenant.
//!
//! ## Session lifecycle
//!
//! Authentication is single-flight: the session slot is a `tokio::sync::Mutex`
//! held across the whole authenticate round trip, so concurrent callers wait
//! for the one in-flight authentication instead of racing their own. When the
//! upstream answers with the session-expired sentinel code, the client drops
//! the stale session, re-authenticates, and retries the call exactly once.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use recbridge_core::domain::errors::UpstreamError;
use recbridge_core::domain::newtypes::UserId;
use recbridge_core::domain::session::SessionInfo;
use recbridge_core::domain::tenant::UpstreamCredentials;
use recbridge_core::ports::upstream::IUpstreamClient;

/// Upstream error code signalling an expired session
const SESSION_EXPIRED_CODE: i64 = 100;

/// Authentication endpoint path
const AUTHENTICATE_PATH: &str = "/authenticate";

/// RPC execution endpoint path
const CALL_METHOD_PATH: &str = "/call_method";

/// Name of the session cookie
const SESSION_COOKIE: &str = "session_id";

/// Transport configuration for one client instance
#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    pub credentials: UpstreamCredentials,
    pub auth_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Retries on transient connection errors
    pub transport_retries: u32,
    /// Initial backoff between transport retries (doubles each attempt)
    pub initial_backoff: Duration,
    /// Context injected into every call (language, timezone)
    pub base_context: Map<String, Value>,
}

impl UpstreamClientConfig {
    /// The context injected when no deployment-specific one is configured
    pub fn default_base_context() -> Map<String, Value> {
        let mut base_context = Map::new();
        base_context.insert("lang".to_string(), json!("en_US"));
        base_context.insert("tz".to_string(), json!("UTC"));
        base_context
    }

    /// Sensible defaults around a set of credentials
    pub fn new(credentials: UpstreamCredentials) -> Self {
        Self {
            credentials,
            auth_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(60),
            transport_retries: 2,
            initial_backoff: Duration::from_millis(300),
            base_context: Self::default_base_context(),
        }
    }
}

/// Session-authenticated JSON-RPC client for one upstream instance
pub struct RpcClient {
    http: reqwest::Client,
    config: UpstreamClientConfig,
    /// Current session; the mutex is held across authentication so it is
    /// single-flight by construction
    session: Mutex<Option<SessionInfo>>,
}

impl RpcClient {
    pub fn new(config: UpstreamClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session: Mutex::new(None),
        }
    }

    /// The base URL this client is bound to
    pub fn base_url(&self) -> &str {
        &self.config.credentials.url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.credentials.url.trim_end_matches('/'), path)
    }

    /// Timeout class for an upstream method
    fn call_timeout(&self, method: &str) -> Duration {
        match method {
            "create" | "write" | "unlink" => self.config.write_timeout,
            _ => self.config.read_timeout,
        }
    }

    /// Return the live session, authenticating under the lock if needed
    async fn ensure_session(&self) -> Result<SessionInfo, UpstreamError> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }
        let session = self.do_authenticate().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Drop a stale session and establish a fresh one (single-flight)
    ///
    /// If another task already replaced the session while this one was
    /// waiting for the lock, the newer session is reused as-is.
    async fn refresh_session(&self, stale: &SessionInfo) -> Result<SessionInfo, UpstreamError> {
        let mut slot = self.session.lock().await;
        if let Some(current) = slot.as_ref() {
            if current.session_id != stale.session_id {
                return Ok(current.clone());
            }
        }
        *slot = None;
        let session = self.do_authenticate().await?;
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Perform the authentication round trip (caller holds the session lock)
    async fn do_authenticate(&self) -> Result<SessionInfo, UpstreamError> {
        let credentials = &self.config.credentials;
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "db": credentials.database,
                "login": credentials.login,
                "password": credentials.secret,
            },
            "id": 1
        });

        debug!(url = %credentials.url, database = %credentials.database, login = %credentials.login,
            "Authenticating with upstream");

        let response = self
            .post(&self.url(AUTHENTICATE_PATH), &payload, self.config.auth_timeout, None, "authenticate")
            .await?;

        let cookie = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .map(|c| c.value().to_string());

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Connection(format!("invalid JSON response: {e}")))?;

        if body.get("error").is_some() {
            return Err(UpstreamError::AuthFailed {
                login: credentials.login.clone(),
            });
        }

        let result = body.get("result").cloned().unwrap_or(Value::Null);
        let uid = result.get("uid").and_then(Value::as_i64).ok_or_else(|| {
            UpstreamError::AuthFailed {
                login: credentials.login.clone(),
            }
        })?;

        let session_id = cookie
            .or_else(|| {
                result
                    .get(SESSION_COOKIE)
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                UpstreamError::Connection("authenticate response carried no session".into())
            })?;

        info!(uid, login = %credentials.login, "Authenticated with upstream");
        Ok(SessionInfo::new(UserId::new(uid), session_id))
    }

    /// POST with transient-error retry and exponential backoff
    async fn post(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
        session: Option<&SessionInfo>,
        operation: &str,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut backoff = self.config.initial_backoff;
        let mut attempt = 0u32;

        loop {
            let mut request = self.http.post(url).json(payload).timeout(timeout);
            if let Some(session) = session {
                request = request.header(
                    reqwest::header::COOKIE,
                    format!("{SESSION_COOKIE}={}", session.session_id),
                );
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(UpstreamError::Connection(format!(
                            "HTTP {status} during {operation}"
                        )));
                    }
                    return Ok(response);
                }
                Err(e) if e.is_timeout() => {
                    return Err(UpstreamError::Timeout {
                        seconds: timeout.as_secs(),
                        operation: operation.to_string(),
                    });
                }
                Err(e) if e.is_connect() && attempt < self.config.transport_retries => {
                    warn!(
                        error = %e,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Transient upstream connection error, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(UpstreamError::Connection(e.to_string())),
            }
        }
    }

    /// One RPC execution against an established session
    async fn execute(
        &self,
        model: &str,
        method: &str,
        args: &[Value],
        kwargs: &Map<String, Value>,
        session: &SessionInfo,
    ) -> Result<Value, UpstreamError> {
        let merged_kwargs = self.merge_context(kwargs, session);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "model": model,
                "method": method,
                "args": args,
                "kwargs": merged_kwargs,
            },
            "id": 1
        });

        debug!(model, method, args_count = args.len(), "Executing upstream call");

        let operation = format!("{model}.{method}");
        let response = self
            .post(
                &self.url(CALL_METHOD_PATH),
                &payload,
                self.call_timeout(method),
                Some(session),
                &operation,
            )
            .await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| UpstreamError::Connection(format!("invalid JSON response: {e}")))?;

        if let Some(error) = body.get("error") {
            return Err(classify_error(error, model, method, args));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Merge the base context and the session uid into `kwargs.context`,
    /// never overwriting caller-supplied keys
    fn merge_context(&self, kwargs: &Map<String, Value>, session: &SessionInfo) -> Map<String, Value> {
        let mut merged = kwargs.clone();
        let mut context = match merged.remove("context") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };

        for (key, value) in &self.config.base_context {
            context.entry(key.clone()).or_insert_with(|| value.clone());
        }
        context
            .entry("uid".to_string())
            .or_insert_with(|| json!(session.uid.value()));

        merged.insert("context".to_string(), Value::Object(context));
        merged
    }
}

#[async_trait::async_trait]
impl IUpstreamClient for RpcClient {
    async fn authenticate(&self) -> Result<SessionInfo, UpstreamError> {
        self.ensure_session().await
    }

    async fn call(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, UpstreamError> {
        let session = self.ensure_session().await?;

        match self.execute(model, method, &args, &kwargs, &session).await {
            Err(UpstreamError::SessionExpired) => {
                warn!(model, method, "Upstream session expired, re-authenticating");
                let fresh = self.refresh_session(&session).await?;
                self.execute(model, method, &args, &kwargs, &fresh).await
            }
            other => other,
        }
    }
}

/// Classify an upstream error payload into a typed [`UpstreamError`]
///
/// The method-not-found pattern is checked before model-not-found: the
/// upstream phrases both with "does not exist".
fn classify_error(error: &Value, model: &str, method: &str, args: &[Value]) -> UpstreamError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let data = error.get("data").cloned().unwrap_or(Value::Null);

    // The nested data message is usually the specific one.
    let message = data
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .unwrap_or("Unknown error")
        .to_string();

    if code == SESSION_EXPIRED_CODE {
        return UpstreamError::SessionExpired;
    }

    let lower = message.to_ascii_lowercase();

    if lower.contains("access denied") || lower.contains("permission") {
        return UpstreamError::PermissionDenied {
            model: model.to_string(),
            method: method.to_string(),
        };
    }

    if lower.contains("method") && lower.contains("does not exist") {
        return UpstreamError::MethodNotFound {
            model: model.to_string(),
            method: method.to_string(),
        };
    }

    if lower.contains("does not exist") && lower.contains("model") {
        return UpstreamError::ModelNotFound(model.to_string());
    }

    if lower.contains("record does not exist") {
        return UpstreamError::RecordNotFound {
            model: model.to_string(),
            record_id: first_record_id(args),
        };
    }

    UpstreamError::Execution {
        code,
        message,
        data,
    }
}

/// Best-effort record id from positional args for error context
fn first_record_id(args: &[Value]) -> i64 {
    match args.first() {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::Array(items)) => items
            .first()
            .and_then(Value::as_i64)
            .unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(body: Value) -> UpstreamError {
        classify_error(&body, "res.partner", "read", &[json!([7])])
    }

    #[test]
    fn test_classify_session_expired() {
        let err = classify(json!({"code": 100, "message": "Session expired"}));
        assert!(matches!(err, UpstreamError::SessionExpired));
    }

    #[test]
    fn test_classify_permission_denied() {
        let err = classify(json!({"code": 200, "message": "Access Denied"}));
        assert!(matches!(err, UpstreamError::PermissionDenied { .. }));
    }

    #[test]
    fn test_classify_method_before_model() {
        let err = classify(json!({
            "code": 200,
            "message": "The method 'frobnicate' does not exist on the model"
        }));
        assert!(matches!(err, UpstreamError::MethodNotFound { .. }));
    }

    #[test]
    fn test_classify_model_not_found() {
        let err = classify(json!({
            "code": 200,
            "message": "The model 'res.partnerx' does not exist"
        }));
        assert!(matches!(err, UpstreamError::ModelNotFound(_)));
    }

    #[test]
    fn test_classify_record_not_found_extracts_id() {
        let err = classify(json!({"code": 200, "message": "Record does not exist or has been deleted"}));
        match err {
            UpstreamError::RecordNotFound { record_id, .. } => assert_eq!(record_id, 7),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_prefers_nested_data_message() {
        let err = classify(json!({
            "code": 200,
            "message": "Upstream Server Error",
            "data": {"message": "Access denied for operation"}
        }));
        assert!(matches!(err, UpstreamError::PermissionDenied { .. }));
    }

    #[test]
    fn test_classify_fallback_execution() {
        let err = classify(json!({"code": 200, "message": "boom", "data": {"name": "KeyError"}}));
        match err {
            UpstreamError::Execution { code, message, .. } => {
                assert_eq!(code, 200);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_merge_context_preserves_caller_keys() {
        let credentials = UpstreamCredentials {
            url: "http://localhost".into(),
            database: "db".into(),
            login: "svc".into(),
            secret: "pw".into(),
        };
        let client = RpcClient::new(UpstreamClientConfig::new(credentials));
        let session = SessionInfo::new(UserId::new(9), "sess");

        let mut kwargs = Map::new();
        kwargs.insert(
            "context".to_string(),
            json!({"lang": "fr_FR", "active_test": false}),
        );

        let merged = client.merge_context(&kwargs, &session);
        let context = merged["context"].as_object().unwrap();
        assert_eq!(context["lang"], json!("fr_FR"));
        assert_eq!(context["tz"], json!("UTC"));
        assert_eq!(context["uid"], json!(9));
        assert_eq!(context["active_test"], json!(false));
    }
}
