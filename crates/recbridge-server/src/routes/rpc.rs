//! RPC gateway endpoints
//!
//! `POST /rpc/{operation}` executes one upstream operation through the
//! gateway pipeline; `POST /rpc/batch` executes a sequence with per-item
//! results.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use recbridge_core::domain::operation::OperationCall;
use recbridge_gateway::{BatchItem, GatewayResponse};

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::state::AppState;

/// Execute one operation
pub async fn execute(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(operation): Path<String>,
    Json(call): Json<OperationCall>,
) -> Result<Json<GatewayResponse>, ApiError> {
    let response = state
        .gateway
        .execute(&auth.tenant_id, &operation, call)
        .await?;
    Ok(Json(response))
}

/// Body of a batch execution
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<BatchItem>,
    #[serde(default)]
    pub stop_on_error: bool,
}

/// Execute a sequence of operations
pub async fn batch(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<BatchRequest>,
) -> Result<Json<Value>, ApiError> {
    let results = state
        .gateway
        .execute_batch(&auth.tenant_id, request.operations, request.stop_on_error)
        .await?;

    let succeeded = results.iter().filter(|r| r.success).count();
    let failed = results.len() - succeeded;

    Ok(Json(json!({
        "total": results.len(),
        "succeeded": succeeded,
        "failed": failed,
        "results": results,
    })))
}
