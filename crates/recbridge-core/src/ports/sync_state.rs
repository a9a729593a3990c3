//! Sync-state store port (driven/secondary port)
//!
//! Watermark bookkeeping per (tenant, user, device, app profile). The store
//! must make `advance` atomic with respect to concurrent pulls for the same
//! key; the monotone-max rule ensures the watermark never regresses even
//! when two pulls race on the same cursor.

use crate::domain::newtypes::EventId;
use crate::domain::sync_state::{SyncKey, SyncStateRow};

/// Port trait for sync-state persistence
#[async_trait::async_trait]
pub trait ISyncStateStore: Send + Sync {
    /// Fetch the row for `key`, creating a fresh one on first use
    async fn get_or_create(&self, key: &SyncKey) -> anyhow::Result<SyncStateRow>;

    /// Fetch the row for `key` without creating it
    async fn find(&self, key: &SyncKey) -> anyhow::Result<Option<SyncStateRow>>;

    /// Advance the watermark of row `row_id`
    ///
    /// Sets `last_event_id := max(old, new_last_event_id)`, stamps
    /// `last_sync_time`, increments `sync_count`, and adds `events_added`
    /// to the lifetime total. Advancing with a smaller event id is a no-op
    /// on the watermark but still records the pull.
    async fn advance(
        &self,
        row_id: i64,
        new_last_event_id: EventId,
        events_added: u64,
    ) -> anyhow::Result<SyncStateRow>;

    /// Reset the row for `key` to force a full resync
    ///
    /// Watermark and sync counter go back to zero. Unknown keys are a no-op.
    async fn reset(&self, key: &SyncKey) -> anyhow::Result<()>;
}
