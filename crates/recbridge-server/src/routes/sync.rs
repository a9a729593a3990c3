//! Delta-pull and sync-state endpoints

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use recbridge_core::domain::change_event::Priority;
use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::{AppProfile, DeviceId};
use recbridge_core::domain::sync_state::{SyncKey, SyncStateRow};
use recbridge_core::ports::sync_state::ISyncStateStore;
use recbridge_core::usecases::pull_delta::PullRequest;

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

fn default_profile() -> String {
    "mobile_app".to_string()
}

/// Body of `POST /sync/pull`
#[derive(Debug, Deserialize)]
pub struct PullBody {
    pub device_id: String,
    #[serde(default = "default_profile")]
    pub app_profile: String,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub model_filter: Option<Vec<String>>,
    #[serde(default)]
    pub priority_filter: Option<Vec<Priority>>,
}

fn sync_key(auth: &AuthContext, device_id: &str, app_profile: &str) -> Result<SyncKey, ApiError> {
    let device_id = DeviceId::new(device_id)
        .map_err(|e| ApiError(GatewayError::BadRequest(e.to_string())))?;
    Ok(SyncKey {
        tenant: auth.tenant_id,
        user_id: auth.user_id,
        device_id,
        app_profile: AppProfile::from(app_profile),
    })
}

fn state_body(row: &SyncStateRow) -> Value {
    json!({
        "device_id": row.key.device_id.as_str(),
        "user_id": row.key.user_id.value(),
        "app_profile": row.key.app_profile.as_str(),
        "last_event_id": row.last_event_id.value(),
        "last_sync_time": row.last_sync_time.map(|t| t.to_rfc3339()),
        "sync_count": row.sync_count,
        "total_events_synced": row.total_events_synced,
        "is_active": row.is_active,
        "next_sync_token": row.last_event_id.value().to_string(),
    })
}

/// `POST /sync/pull` - delta pull for one device
pub async fn pull(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<PullBody>,
) -> Result<Json<Value>, ApiError> {
    let key = sync_key(&auth, &body.device_id, &body.app_profile)?;
    let profile = key.app_profile.as_str().to_string();

    let usecase = state.pull_usecase(&auth.tenant_id).await?;
    let outcome = usecase
        .execute(&PullRequest {
            key,
            model_filter: body.model_filter,
            priority_filter: body.priority_filter,
            limit: body.limit,
        })
        .await?;

    state.metrics.record_pull(
        &profile,
        if outcome.has_updates { "updates" } else { "empty" },
    );

    Ok(Json(json!({
        "has_updates": outcome.has_updates,
        "new_events_count": outcome.events.len(),
        "events": outcome.events,
        "last_event_id": outcome.last_event_id.value(),
        "has_more": outcome.has_more,
        "sync_state": state_body(&outcome.sync_state),
    })))
}

/// Query of `GET /sync/state`
#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub device_id: String,
    #[serde(default = "default_profile")]
    pub app_profile: String,
}

/// `GET /sync/state` - inspect (or lazily create) a device's sync state
pub async fn state(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<StateQuery>,
) -> Result<Json<Value>, ApiError> {
    let key = sync_key(&auth, &query.device_id, &query.app_profile)?;
    let store = state.sync_state_store(&auth.tenant_id).await?;

    let row = store
        .get_or_create(&key)
        .await
        .map_err(GatewayError::from_port_error)?;

    Ok(Json(state_body(&row)))
}

/// Body of `POST /sync/reset`
#[derive(Debug, Deserialize)]
pub struct ResetBody {
    pub device_id: String,
    #[serde(default = "default_profile")]
    pub app_profile: String,
}

/// `POST /sync/reset` - force a full resync for one device
pub async fn reset(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<ResetBody>,
) -> Result<Json<Value>, ApiError> {
    let key = sync_key(&auth, &body.device_id, &body.app_profile)?;
    let store = state.sync_state_store(&auth.tenant_id).await?;

    store
        .reset(&key)
        .await
        .map_err(GatewayError::from_port_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Sync state reset successfully",
        "device_id": body.device_id,
    })))
}
