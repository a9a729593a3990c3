//! Offline synchronization endpoints
//!
//! `POST /offline-sync/push` uploads a batch of client-buffered mutations;
//! `POST /offline-sync/resolve-conflicts` applies explicit resolutions for
//! conflicts returned by an earlier push.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::local_change::{
    ConflictRecord, ConflictStrategy, LocalChange, SyncAction, SyncStatus,
};
use recbridge_core::domain::newtypes::DeviceId;
use recbridge_core::ports::record_writer::IRecordWriter;
use recbridge_core::usecases::push_changes::{PushChangesUseCase, PushRequest};
use recbridge_core::usecases::resolve_conflicts::{ConflictResolution, ResolveConflictsUseCase};

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /offline-sync/push`
#[derive(Debug, Deserialize)]
pub struct PushBody {
    pub device_id: String,
    pub changes: Vec<LocalChange>,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    #[serde(default)]
    pub stop_on_error: bool,
    #[serde(default)]
    pub batch_size: Option<u32>,
}

/// `POST /offline-sync/push` - apply client-buffered mutations
pub async fn push(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<PushBody>,
) -> Result<Json<Value>, ApiError> {
    let device_id = DeviceId::new(&body.device_id)
        .map_err(|e| ApiError(GatewayError::BadRequest(e.to_string())))?;

    let writer: Arc<dyn IRecordWriter> = Arc::clone(&state.gateway) as Arc<dyn IRecordWriter>;
    let usecase = PushChangesUseCase::new(writer);

    let outcome = usecase
        .execute(PushRequest {
            tenant: auth.tenant_id,
            user_id: auth.user_id,
            device_id,
            changes: body.changes,
            conflict_strategy: body.conflict_strategy,
            stop_on_error: body.stop_on_error,
            batch_size: body.batch_size,
        })
        .await?;

    for result in &outcome.results {
        let action = match result.action {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
        };
        let status = match result.status {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
            SyncStatus::Conflict => "conflict",
        };
        state.metrics.record_push_item(action, status);
    }
    if outcome.conflicts > 0 {
        state
            .metrics
            .record_conflict(strategy_name(body.conflict_strategy));
    }

    Ok(Json(json!({
        "success": outcome.success,
        "total": outcome.total,
        "succeeded": outcome.succeeded,
        "failed": outcome.failed,
        "conflicts": outcome.conflicts,
        "results": outcome.results,
        "id_mapping": outcome.id_mapping,
        "next_sync_token": outcome.next_sync_token,
        "server_timestamp": outcome.server_timestamp.to_rfc3339(),
        "total_processing_time_ms": outcome.total_processing_time_ms,
        "average_processing_time_ms": outcome.average_processing_time_ms,
    })))
}

/// Body of `POST /offline-sync/resolve-conflicts`
#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    #[serde(default)]
    pub device_id: Option<String>,
    pub conflicts: Vec<ConflictRecord>,
    pub resolutions: Vec<ConflictResolution>,
}

/// `POST /offline-sync/resolve-conflicts` - apply explicit resolutions
pub async fn resolve_conflicts(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<ResolveBody>,
) -> Result<Json<Value>, ApiError> {
    let writer: Arc<dyn IRecordWriter> = Arc::clone(&state.gateway) as Arc<dyn IRecordWriter>;
    let usecase = ResolveConflictsUseCase::new(writer);

    let outcome = usecase
        .execute(&auth.tenant_id, &body.conflicts, &body.resolutions)
        .await;

    Ok(Json(json!({
        "success": outcome.success,
        "resolved": outcome.resolved,
        "failed": outcome.failed,
        "results": outcome.results,
    })))
}

fn strategy_name(strategy: ConflictStrategy) -> &'static str {
    match strategy {
        ConflictStrategy::ServerWins => "server_wins",
        ConflictStrategy::ClientWins => "client_wins",
        ConflictStrategy::Manual => "manual",
        ConflictStrategy::NewestWins => "newest_wins",
        ConflictStrategy::Merge => "merge",
    }
}
