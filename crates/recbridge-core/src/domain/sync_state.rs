//! Per-device sync state
//!
//! One row per (tenant, user, device, app profile). The watermark
//! (`last_event_id`) only ever moves forward; two concurrent pulls that read
//! the same batch cannot regress it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{AppProfile, DeviceId, EventId, TenantId, UserId};

/// Key of a sync-state row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKey {
    pub tenant: TenantId,
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub app_profile: AppProfile,
}

/// The sync bookkeeping row for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStateRow {
    /// Upstream row id (for `advance`/`reset` writes)
    pub id: i64,
    pub key: SyncKey,
    /// Highest event id this device has observed
    pub last_event_id: EventId,
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Number of completed pulls
    pub sync_count: u64,
    /// Events delivered over the row's lifetime
    pub total_events_synced: u64,
    pub is_active: bool,
}

impl SyncStateRow {
    /// A fresh row for a device that has never pulled
    pub fn fresh(id: i64, key: SyncKey) -> Self {
        Self {
            id,
            key,
            last_event_id: EventId::ZERO,
            last_sync_time: None,
            sync_count: 0,
            total_events_synced: 0,
            is_active: true,
        }
    }

    /// Apply an advance locally, honoring the monotone max rule
    ///
    /// Returns `true` when the watermark actually moved. An advance with a
    /// smaller event id still counts the pull but leaves the watermark.
    pub fn apply_advance(&mut self, new_last: EventId, events_added: u64) -> bool {
        let moved = new_last > self.last_event_id;
        if moved {
            self.last_event_id = new_last;
        }
        self.last_sync_time = Some(Utc::now());
        self.sync_count += 1;
        self.total_events_synced += events_added;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SyncKey {
        SyncKey {
            tenant: TenantId::new(),
            user_id: UserId::new(1),
            device_id: DeviceId::new("d-1").unwrap(),
            app_profile: AppProfile::SalesApp,
        }
    }

    #[test]
    fn test_fresh_row_starts_at_zero() {
        let row = SyncStateRow::fresh(1, key());
        assert_eq!(row.last_event_id, EventId::ZERO);
        assert_eq!(row.sync_count, 0);
        assert!(row.is_active);
    }

    #[test]
    fn test_advance_is_monotone() {
        let mut row = SyncStateRow::fresh(1, key());
        assert!(row.apply_advance(EventId::new(103), 3));
        assert_eq!(row.last_event_id, EventId::new(103));

        // A stale advance keeps the watermark but still records the pull
        assert!(!row.apply_advance(EventId::new(50), 0));
        assert_eq!(row.last_event_id, EventId::new(103));
        assert_eq!(row.sync_count, 2);
        assert_eq!(row.total_events_synced, 3);
    }
}
