//! Conflict resolution use case
//!
//! The explicit second half of the manual conflict flow: the client reviews
//! the conflict descriptors returned by a push and submits one resolution
//! per conflict, possibly with hand-merged values.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::domain::errors::GatewayError;
use crate::domain::local_change::{
    ConflictRecord, ConflictStrategy, PushResult, SyncAction, SyncStatus,
};
use crate::domain::newtypes::TenantId;
use crate::ports::record_writer::IRecordWriter;

/// One client-chosen resolution
#[derive(Debug, Clone, Deserialize)]
pub struct ConflictResolution {
    /// The conflict this resolves (matched against the conflict list)
    pub local_id: String,
    pub strategy: ConflictStrategy,
    /// Required for the `merge` strategy
    #[serde(default)]
    pub merged_data: Option<Map<String, Value>>,
}

/// Aggregate result of a resolve call
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub success: bool,
    pub resolved: usize,
    pub failed: usize,
    pub results: Vec<PushResult>,
}

/// Use case for applying conflict resolutions
pub struct ResolveConflictsUseCase {
    writer: Arc<dyn IRecordWriter>,
}

impl ResolveConflictsUseCase {
    pub fn new(writer: Arc<dyn IRecordWriter>) -> Self {
        Self { writer }
    }

    /// Apply each resolution against its conflict descriptor
    ///
    /// Unknown local ids and merge resolutions without merged values fail
    /// individually; nothing aborts the batch.
    pub async fn execute(
        &self,
        tenant: &TenantId,
        conflicts: &[ConflictRecord],
        resolutions: &[ConflictResolution],
    ) -> ResolveOutcome {
        let mut results = Vec::with_capacity(resolutions.len());

        for resolution in resolutions {
            let Some(conflict) = conflicts.iter().find(|c| c.local_id == resolution.local_id)
            else {
                results.push(failed_result(
                    &resolution.local_id,
                    "",
                    None,
                    "conflict not found",
                ));
                continue;
            };

            let result = self.apply(tenant, conflict, resolution).await;
            results.push(result);
        }

        let resolved = results.iter().filter(|r| r.status == SyncStatus::Success).count();
        let failed = results.len() - resolved;

        info!(resolved, failed, "Conflict resolution complete");

        ResolveOutcome {
            success: failed == 0,
            resolved,
            failed,
            results,
        }
    }

    async fn apply(
        &self,
        tenant: &TenantId,
        conflict: &ConflictRecord,
        resolution: &ConflictResolution,
    ) -> PushResult {
        let values = match resolution.strategy {
            // Server copy stands; nothing to write.
            ConflictStrategy::ServerWins => {
                return success_result(conflict);
            }
            ConflictStrategy::ClientWins => conflict.local_data.clone(),
            ConflictStrategy::Merge => match &resolution.merged_data {
                Some(merged) => merged.clone(),
                None => {
                    return failed_result(
                        &conflict.local_id,
                        &conflict.model,
                        Some(conflict.server_id),
                        "merged_data is required for the merge strategy",
                    );
                }
            },
            ConflictStrategy::Manual | ConflictStrategy::NewestWins => {
                return failed_result(
                    &conflict.local_id,
                    &conflict.model,
                    Some(conflict.server_id),
                    "strategy is not applicable to explicit resolution",
                );
            }
        };

        match self
            .writer
            .write(tenant, &conflict.model, &[conflict.server_id], values)
            .await
        {
            Ok(true) => success_result(conflict),
            Ok(false) => failed_result(
                &conflict.local_id,
                &conflict.model,
                Some(conflict.server_id),
                "upstream reported unsuccessful write",
            ),
            Err(e) => failed_result(
                &conflict.local_id,
                &conflict.model,
                Some(conflict.server_id),
                &e.to_string(),
            ),
        }
    }
}

fn success_result(conflict: &ConflictRecord) -> PushResult {
    PushResult {
        local_id: conflict.local_id.clone(),
        status: SyncStatus::Success,
        action: SyncAction::Update,
        model: conflict.model.clone(),
        server_id: Some(conflict.server_id),
        error: None,
        error_code: None,
        conflict: None,
        processing_time_ms: 0.0,
    }
}

fn failed_result(local_id: &str, model: &str, server_id: Option<i64>, error: &str) -> PushResult {
    PushResult {
        local_id: local_id.to_string(),
        status: SyncStatus::Failed,
        action: SyncAction::Update,
        model: model.to_string(),
        server_id,
        error: Some(error.to_string()),
        error_code: None,
        conflict: None,
        processing_time_ms: 0.0,
    }
}
