//! Delta pull use case
//!
//! Orchestrates incremental synchronization: given a client identity, reads
//! the change log strictly after the device's watermark, advances the
//! watermark, and best-effort acknowledges the delivered events.
//!
//! Two concurrent pulls for the same device may both read the same batch;
//! the store's monotone-max advance rule guarantees the watermark never
//! regresses, and clients de-duplicate by event id.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::change_event::{ChangeEvent, Priority};
use crate::domain::errors::GatewayError;
use crate::domain::newtypes::EventId;
use crate::domain::sync_state::{SyncKey, SyncStateRow};
use crate::ports::change_log::{ChangeLogQuery, IChangeLogReader};
use crate::ports::sync_state::ISyncStateStore;

/// Hard cap on a single pull batch
const MAX_PULL_LIMIT: u32 = 1000;

/// Default batch size when the client does not ask for one
const DEFAULT_PULL_LIMIT: u32 = 100;

/// A delta pull request for one device
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub key: SyncKey,
    /// Explicit model filter; falls back to the app profile's model set
    pub model_filter: Option<Vec<String>>,
    pub priority_filter: Option<Vec<Priority>>,
    pub limit: Option<u32>,
}

/// Result of a delta pull
#[derive(Debug, Clone)]
pub struct PullOutcome {
    pub has_updates: bool,
    pub events: Vec<ChangeEvent>,
    /// The watermark after this pull
    pub last_event_id: EventId,
    /// Whether events beyond this batch remain
    pub has_more: bool,
    pub sync_state: SyncStateRow,
}

/// Use case for pulling deltas and advancing watermarks
pub struct PullDeltaUseCase {
    change_log: Arc<dyn IChangeLogReader>,
    sync_state: Arc<dyn ISyncStateStore>,
    /// Whether delivered events are acknowledged upstream after advance
    ack_after_pull: bool,
}

impl PullDeltaUseCase {
    pub fn new(change_log: Arc<dyn IChangeLogReader>, sync_state: Arc<dyn ISyncStateStore>) -> Self {
        Self {
            change_log,
            sync_state,
            ack_after_pull: true,
        }
    }

    /// Disable the post-pull acknowledge calls (used by tests and by
    /// deployments whose upstream lacks the acknowledge methods)
    pub fn without_ack(mut self) -> Self {
        self.ack_after_pull = false;
        self
    }

    /// Execute one pull
    ///
    /// 1. Load (or create) the sync-state row.
    /// 2. Compose the effective model set: explicit filter, else profile.
    /// 3. Read events strictly after the watermark, oldest first.
    /// 4. Empty batch: report `has_updates = false` without advancing.
    /// 5. Otherwise advance to the batch maximum, acknowledge best-effort,
    ///    and report the batch.
    pub async fn execute(&self, request: &PullRequest) -> Result<PullOutcome, GatewayError> {
        let row = self
            .sync_state
            .get_or_create(&request.key)
            .await
            .map_err(GatewayError::from_port_error)?;

        let models = self.effective_models(request);
        let limit = request
            .limit
            .unwrap_or(DEFAULT_PULL_LIMIT)
            .clamp(1, MAX_PULL_LIMIT);

        let query = ChangeLogQuery::after(row.last_event_id)
            .with_models(models)
            .with_priorities(request.priority_filter.clone())
            .with_limit(limit);

        let events = self
            .change_log
            .fetch(&query)
            .await
            .map_err(GatewayError::from_port_error)?;

        if events.is_empty() {
            debug!(
                device = %request.key.device_id,
                watermark = %row.last_event_id,
                "No new events"
            );
            return Ok(PullOutcome {
                has_updates: false,
                events: Vec::new(),
                last_event_id: row.last_event_id,
                has_more: false,
                sync_state: row,
            });
        }

        let new_last = events
            .iter()
            .map(|e| e.event_id)
            .max()
            .unwrap_or(row.last_event_id);

        let updated_row = self
            .sync_state
            .advance(row.id, new_last, events.len() as u64)
            .await
            .map_err(GatewayError::from_port_error)?;

        if self.ack_after_pull {
            self.acknowledge_best_effort(&events, request).await;
        }

        let has_more = self.remaining_after(&query, events.len()).await;

        info!(
            device = %request.key.device_id,
            user = %request.key.user_id,
            events = events.len(),
            last_event_id = %new_last,
            has_more,
            "Delta pull complete"
        );

        Ok(PullOutcome {
            has_updates: true,
            events,
            last_event_id: updated_row.last_event_id,
            has_more,
            sync_state: updated_row,
        })
    }

    /// Explicit filter wins; otherwise the profile's model set, and an
    /// unknown profile (empty set) means no model restriction at all
    fn effective_models(&self, request: &PullRequest) -> Option<Vec<String>> {
        if let Some(filter) = &request.model_filter {
            if !filter.is_empty() {
                return Some(filter.clone());
            }
        }
        let profile_models = request.key.app_profile.models();
        if profile_models.is_empty() {
            None
        } else {
            Some(profile_models.iter().map(|m| m.to_string()).collect())
        }
    }

    /// Acknowledge delivered events; failures are logged and swallowed
    async fn acknowledge_best_effort(&self, events: &[ChangeEvent], request: &PullRequest) {
        let event_ids: Vec<EventId> = events.iter().map(|e| e.event_id).collect();

        if let Err(e) = self.change_log.acknowledge(&event_ids).await {
            warn!(error = %e, count = event_ids.len(), "Failed to acknowledge events");
        }
        if let Err(e) = self
            .change_log
            .mark_synced_by_user(&event_ids, request.key.user_id)
            .await
        {
            warn!(error = %e, user = %request.key.user_id, "Failed to mark events synced");
        }
    }

    /// Whether more matching events exist past the returned batch
    async fn remaining_after(&self, query: &ChangeLogQuery, delivered: usize) -> bool {
        match self.change_log.count(query).await {
            Ok(total) => total > delivered as u64,
            Err(e) => {
                warn!(error = %e, "Failed to count remaining events");
                false
            }
        }
    }
}
