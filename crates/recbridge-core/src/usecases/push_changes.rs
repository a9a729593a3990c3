//! Offline push use case
//!
//! Accepts a batch of client-buffered mutations, orders them by their
//! declared dependencies, applies them through the record-writer port with
//! conflict detection, and returns per-item results plus the mapping from
//! client-local ids to server ids.
//!
//! Writes go through the gateway's record writer, so cache invalidation and
//! change fan-out happen exactly as for direct RPC writes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::errors::GatewayError;
use crate::domain::local_change::{
    resolve_placeholders, sort_by_dependencies, ConflictRecord, ConflictStrategy, LocalChange,
    PushResult, SyncAction, SyncStatus,
};
use crate::domain::newtypes::{DeviceId, TenantId, UserId};
use crate::ports::record_writer::IRecordWriter;

/// Default number of changes applied per batch chunk
const DEFAULT_BATCH_SIZE: u32 = 50;

/// Upper bound on the batch chunk size
const MAX_BATCH_SIZE: u32 = 500;

/// The server-side timestamp column consulted for conflict detection
const WRITE_TIME_FIELD: &str = "write_date";

/// A full offline push request
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub tenant: TenantId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub changes: Vec<LocalChange>,
    pub conflict_strategy: ConflictStrategy,
    pub stop_on_error: bool,
    pub batch_size: Option<u32>,
}

/// Aggregate result of an offline push
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// True when no item failed (conflicts do not count as failures)
    pub success: bool,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub results: Vec<PushResult>,
    /// `local_id -> server_id` produced by successful creates
    pub id_mapping: HashMap<String, i64>,
    pub next_sync_token: String,
    pub server_timestamp: DateTime<Utc>,
    pub total_processing_time_ms: f64,
    pub average_processing_time_ms: f64,
}

/// Use case for applying client-buffered mutations
pub struct PushChangesUseCase {
    writer: Arc<dyn IRecordWriter>,
}

impl PushChangesUseCase {
    pub fn new(writer: Arc<dyn IRecordWriter>) -> Self {
        Self { writer }
    }

    /// Execute one push
    ///
    /// A dependency cycle fails the whole push with `BadRequest`; every
    /// other failure is a per-item result. With `stop_on_error`, processing
    /// stops after the first `failed` item (conflicts do not stop it).
    pub async fn execute(&self, request: PushRequest) -> Result<PushOutcome, GatewayError> {
        let started = Instant::now();
        let batch_size = request
            .batch_size
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .clamp(1, MAX_BATCH_SIZE) as usize;

        let sorted = sort_by_dependencies(request.changes.clone())
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        let mut results: Vec<PushResult> = Vec::with_capacity(sorted.len());
        let mut id_mapping: HashMap<String, i64> = HashMap::new();

        'batches: for batch in sorted.chunks(batch_size) {
            for change in batch {
                let item_started = Instant::now();
                let mut result = self
                    .process_change(&request, change, &mut id_mapping)
                    .await;
                result.processing_time_ms = item_started.elapsed().as_secs_f64() * 1000.0;

                let failed = result.status == SyncStatus::Failed;
                results.push(result);

                if failed && request.stop_on_error {
                    warn!(device = %request.device_id, "Stopping push after failed item");
                    break 'batches;
                }
            }
        }

        let succeeded = results.iter().filter(|r| r.status == SyncStatus::Success).count();
        let failed = results.iter().filter(|r| r.status == SyncStatus::Failed).count();
        let conflicts = results.iter().filter(|r| r.status == SyncStatus::Conflict).count();
        let total_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            device = %request.device_id,
            total = results.len(),
            succeeded,
            failed,
            conflicts,
            "Offline push complete"
        );

        Ok(PushOutcome {
            success: failed == 0,
            total: results.len(),
            succeeded,
            failed,
            conflicts,
            average_processing_time_ms: if results.is_empty() {
                0.0
            } else {
                total_ms / results.len() as f64
            },
            total_processing_time_ms: total_ms,
            results,
            id_mapping,
            next_sync_token: sync_token(request.user_id, &request.device_id),
            server_timestamp: Utc::now(),
        })
    }

    async fn process_change(
        &self,
        request: &PushRequest,
        change: &LocalChange,
        id_mapping: &mut HashMap<String, i64>,
    ) -> PushResult {
        let data = resolve_placeholders(&change.data, id_mapping);

        match change.action {
            SyncAction::Create => self.handle_create(request, change, data, id_mapping).await,
            SyncAction::Update => {
                self.handle_update(request, change, data, request.conflict_strategy)
                    .await
            }
            SyncAction::Delete => self.handle_delete(request, change).await,
        }
    }

    async fn handle_create(
        &self,
        request: &PushRequest,
        change: &LocalChange,
        data: Map<String, Value>,
        id_mapping: &mut HashMap<String, i64>,
    ) -> PushResult {
        match self.writer.create(&request.tenant, &change.model, data).await {
            Ok(server_id) => {
                id_mapping.insert(change.local_id.clone(), server_id);
                success(change, Some(server_id))
            }
            Err(e) => failure(change, e),
        }
    }

    async fn handle_update(
        &self,
        request: &PushRequest,
        change: &LocalChange,
        data: Map<String, Value>,
        strategy: ConflictStrategy,
    ) -> PushResult {
        let Some(record_id) = change.record_id else {
            return missing_record_id(change);
        };

        // The client's version counter only arms the comparison; the
        // decision itself is by timestamps.
        if change.version > 1 {
            match self.read_server_state(request, change, record_id).await {
                Err(e) => return failure(change, e),
                Ok(None) => {}
                Ok(Some((server_time, server_data))) if server_time > change.local_timestamp => {
                    match strategy {
                        ConflictStrategy::ServerWins => {
                            return conflict_skipped(change, record_id, strategy, server_time);
                        }
                        ConflictStrategy::NewestWins => {
                            // local_timestamp < server_time here, so the
                            // server copy is newer: skip.
                            return conflict_skipped(change, record_id, strategy, server_time);
                        }
                        ConflictStrategy::Manual => {
                            return manual_conflict(change, record_id, server_time, server_data);
                        }
                        ConflictStrategy::ClientWins | ConflictStrategy::Merge => {
                            debug!(
                                local_id = %change.local_id,
                                "Conflict detected, client data proceeds"
                            );
                        }
                    }
                }
                Ok(Some(_)) => {}
            }
        }

        match self
            .writer
            .write(&request.tenant, &change.model, &[record_id], data)
            .await
        {
            Ok(true) => success(change, Some(record_id)),
            Ok(false) => PushResult {
                status: SyncStatus::Failed,
                error: Some("upstream reported unsuccessful write".to_string()),
                error_code: Some("UPSTREAM_ERROR".to_string()),
                ..base_result(change, Some(record_id))
            },
            Err(e) => failure(change, e),
        }
    }

    async fn handle_delete(&self, request: &PushRequest, change: &LocalChange) -> PushResult {
        let Some(record_id) = change.record_id else {
            return missing_record_id(change);
        };

        match self
            .writer
            .unlink(&request.tenant, &change.model, &[record_id])
            .await
        {
            Ok(_) => success(change, Some(record_id)),
            Err(e) => failure(change, e),
        }
    }

    /// Read the server record's write time and current values for the
    /// fields the client wants to change
    ///
    /// Returns `None` when the record no longer exists upstream (the write
    /// will then fail with the upstream's own message).
    async fn read_server_state(
        &self,
        request: &PushRequest,
        change: &LocalChange,
        record_id: i64,
    ) -> Result<Option<(DateTime<Utc>, Map<String, Value>)>, GatewayError> {
        let mut fields: Vec<String> = change.data.keys().cloned().collect();
        fields.push(WRITE_TIME_FIELD.to_string());

        let rows = self
            .writer
            .read(&request.tenant, &change.model, &[record_id], &fields)
            .await?;

        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let Some(server_time) = row.get(WRITE_TIME_FIELD).and_then(parse_server_time) else {
            return Ok(None);
        };

        let mut server_data = row;
        server_data.remove(WRITE_TIME_FIELD);
        Ok(Some((server_time, server_data)))
    }
}

/// Parse the upstream's record timestamps (RFC 3339 or `%Y-%m-%d %H:%M:%S`)
fn parse_server_time(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Opaque sync token handed back after every push
fn sync_token(user_id: UserId, device_id: &DeviceId) -> String {
    format!("{}_{}_{}", user_id, device_id, Utc::now().timestamp())
}

fn base_result(change: &LocalChange, server_id: Option<i64>) -> PushResult {
    PushResult {
        local_id: change.local_id.clone(),
        status: SyncStatus::Success,
        action: change.action,
        model: change.model.clone(),
        server_id,
        error: None,
        error_code: None,
        conflict: None,
        processing_time_ms: 0.0,
    }
}

fn success(change: &LocalChange, server_id: Option<i64>) -> PushResult {
    base_result(change, server_id)
}

fn failure(change: &LocalChange, error: GatewayError) -> PushResult {
    PushResult {
        status: SyncStatus::Failed,
        error: Some(error.to_string()),
        error_code: Some("UPSTREAM_ERROR".to_string()),
        ..base_result(change, change.record_id)
    }
}

fn missing_record_id(change: &LocalChange) -> PushResult {
    PushResult {
        status: SyncStatus::Failed,
        error: Some(format!("record_id is required for {:?}", change.action)),
        error_code: Some("MISSING_RECORD_ID".to_string()),
        ..base_result(change, None)
    }
}

fn conflict_skipped(
    change: &LocalChange,
    record_id: i64,
    strategy: ConflictStrategy,
    server_time: DateTime<Utc>,
) -> PushResult {
    PushResult {
        status: SyncStatus::Conflict,
        error: Some("conflict detected - server version retained".to_string()),
        conflict: Some(ConflictRecord {
            local_id: change.local_id.clone(),
            model: change.model.clone(),
            server_id: record_id,
            strategy,
            resolution: Some("skipped".to_string()),
            requires_resolution: false,
            local_data: change.data.clone(),
            server_data: Map::new(),
            local_timestamp: change.local_timestamp,
            server_timestamp: Some(server_time),
            conflicting_fields: Vec::new(),
        }),
        ..base_result(change, Some(record_id))
    }
}

fn manual_conflict(
    change: &LocalChange,
    record_id: i64,
    server_time: DateTime<Utc>,
    server_data: Map<String, Value>,
) -> PushResult {
    let conflicting_fields = change
        .data
        .iter()
        .filter(|(field, local_value)| {
            server_data
                .get(*field)
                .map_or(false, |server_value| server_value != *local_value)
        })
        .map(|(field, _)| field.clone())
        .collect();

    PushResult {
        status: SyncStatus::Conflict,
        conflict: Some(ConflictRecord {
            local_id: change.local_id.clone(),
            model: change.model.clone(),
            server_id: record_id,
            strategy: ConflictStrategy::Manual,
            resolution: None,
            requires_resolution: true,
            local_data: change.data.clone(),
            server_data,
            local_timestamp: change.local_timestamp,
            server_timestamp: Some(server_time),
            conflicting_fields,
        }),
        ..base_result(change, Some(record_id))
    }
}
