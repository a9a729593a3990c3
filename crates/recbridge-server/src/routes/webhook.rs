//! Push receiver
//!
//! Authenticated ingress for real-time notifications of high-priority
//! events from the upstream. Nothing is persisted here - the upstream's
//! change log stays authoritative; the only effect is an immediate fan-out
//! so subscribed users do not wait for their next pull. Duplicate pushes
//! produce duplicate broadcasts, which consumers de-duplicate by event id.

use std::str::FromStr;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use recbridge_core::domain::change_event::EventKind;
use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::TenantId;
use recbridge_core::ports::broadcast::IEventBroadcaster;

use crate::auth::{bearer_token, decode_token};
use crate::error::ApiError;
use crate::state::AppState;

/// Channel notified for high-priority events
const CRITICAL_CHANNEL: &str = "critical_events";

/// Payload pushed by the upstream
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Required when authenticating with the shared API key; with a bearer
    /// token the tenant comes from the claims
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub model: String,
    pub record_id: i64,
    pub event: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub event_id: Option<i64>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// `POST /webhooks/receive` - upstream push ingress
///
/// Accepts either a bearer token or the shared `X-API-Key`.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<WebhookPayload>,
) -> Result<Json<Value>, ApiError> {
    let tenant_id = authenticate(&state, &headers, &body)?;

    let kind = EventKind::parse(&body.event).unwrap_or(EventKind::Manual);
    let payload = body.payload.clone().unwrap_or(Value::Null);

    state
        .fanout
        .broadcast_record_update(&tenant_id, &body.model, body.record_id, kind, payload)
        .await;

    if body.priority.as_deref() == Some("high") {
        state
            .fanout
            .broadcast_to_channel(
                CRITICAL_CHANNEL,
                json!({
                    "type": "critical_event",
                    "model": body.model,
                    "record_id": body.record_id,
                    "event": body.event,
                    "event_id": body.event_id,
                    "timestamp": body.timestamp,
                }),
            )
            .await;
    }

    debug!(model = %body.model, record_id = body.record_id, "Webhook broadcast");

    Ok(Json(json!({
        "success": true,
        "message": "Webhook received and processed",
        "event_id": body.event_id,
    })))
}

/// Accept a bearer token (tenant from claims) or the shared API key
/// (tenant from the payload)
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    body: &WebhookPayload,
) -> Result<TenantId, ApiError> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if let Some(token) = bearer_token(auth_header) {
        if let Ok(context) = decode_token(token, &state.jwt_secret) {
            return Ok(context.tenant_id);
        }
    }

    let api_key = headers.get("X-API-Key").and_then(|value| value.to_str().ok());
    if api_key.is_some_and(|key| !state.webhook_api_key.is_empty() && key == state.webhook_api_key)
    {
        let raw = body.tenant_id.as_deref().ok_or_else(|| {
            ApiError(GatewayError::BadRequest(
                "tenant_id is required with API-key authentication".into(),
            ))
        })?;
        return TenantId::from_str(raw)
            .map_err(|_| ApiError(GatewayError::BadRequest("malformed tenant_id".into())));
    }

    Err(ApiError(GatewayError::AuthMissing))
}
