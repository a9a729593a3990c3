//! Sync-state store over upstream RPC
//!
//! The per-device watermark rows live in an upstream table exposed through
//! ordinary RPC (`search_read`, `create`, `write`). One store instance is
//! bound to one tenant's client; the advance operation applies the monotone
//! max rule so a racing pull can never move a watermark backwards.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use recbridge_core::domain::newtypes::{AppProfile, DeviceId, EventId, TenantId, UserId};
use recbridge_core::domain::predicate::SearchDomain;
use recbridge_core::domain::sync_state::{SyncKey, SyncStateRow};
use recbridge_core::ports::sync_state::ISyncStateStore;
use recbridge_core::ports::upstream::IUpstreamClient;

/// Model name of the sync-state table in the upstream
const SYNC_STATE_MODEL: &str = "client.sync.state";

/// Columns fetched for every row
const STATE_FIELDS: &[&str] = &[
    "id",
    "user_id",
    "device_id",
    "app_profile",
    "last_event_id",
    "last_sync_time",
    "sync_count",
    "total_events_synced",
    "is_active",
];

/// RPC-backed implementation of the sync-state port
pub struct RpcSyncStateStore {
    client: Arc<dyn IUpstreamClient>,
    /// The tenant whose upstream this store is bound to
    tenant: TenantId,
}

impl RpcSyncStateStore {
    pub fn new(client: Arc<dyn IUpstreamClient>, tenant: TenantId) -> Self {
        Self { client, tenant }
    }

    fn key_domain(key: &SyncKey) -> SearchDomain {
        let mut domain = SearchDomain::empty();
        domain.push_leaf("user_id", "=", json!(key.user_id.value()));
        domain.push_leaf("device_id", "=", json!(key.device_id.as_str()));
        domain.push_leaf("app_profile", "=", json!(key.app_profile.as_str()));
        domain
    }

    async fn search_one(&self, key: &SyncKey) -> anyhow::Result<Option<SyncStateRow>> {
        let mut kwargs = Map::new();
        kwargs.insert("domain".to_string(), Self::key_domain(key).to_json());
        kwargs.insert("fields".to_string(), json!(STATE_FIELDS));
        kwargs.insert("limit".to_string(), json!(1));

        let result = self
            .client
            .call(SYNC_STATE_MODEL, "search_read", Vec::new(), kwargs)
            .await
            .context("sync-state search_read failed")?;

        Ok(result
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| self.parse_row(row)))
    }

    async fn read_by_id(&self, row_id: i64) -> anyhow::Result<Option<SyncStateRow>> {
        let mut kwargs = Map::new();
        kwargs.insert("fields".to_string(), json!(STATE_FIELDS));

        let result = self
            .client
            .call(SYNC_STATE_MODEL, "read", vec![json!([row_id])], kwargs)
            .await
            .context("sync-state read failed")?;

        Ok(result
            .as_array()
            .and_then(|rows| rows.first())
            .and_then(|row| self.parse_row(row)))
    }

    fn parse_row(&self, row: &Value) -> Option<SyncStateRow> {
        let id = row.get("id").and_then(Value::as_i64)?;
        let user_id = row.get("user_id").and_then(Value::as_i64)?;
        let device_id = row
            .get("device_id")
            .and_then(Value::as_str)
            .and_then(|raw| DeviceId::new(raw).ok())?;
        let app_profile = row
            .get("app_profile")
            .and_then(Value::as_str)
            .map(AppProfile::from)?;

        Some(SyncStateRow {
            id,
            key: SyncKey {
                tenant: self.tenant,
                user_id: UserId::new(user_id),
                device_id,
                app_profile,
            },
            last_event_id: EventId::new(
                row.get("last_event_id").and_then(Value::as_i64).unwrap_or(0),
            ),
            last_sync_time: row.get("last_sync_time").and_then(parse_timestamp),
            sync_count: row.get("sync_count").and_then(Value::as_u64).unwrap_or(0),
            total_events_synced: row
                .get("total_events_synced")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            is_active: row.get("is_active").and_then(Value::as_bool).unwrap_or(true),
        })
    }
}

#[async_trait::async_trait]
impl ISyncStateStore for RpcSyncStateStore {
    async fn get_or_create(&self, key: &SyncKey) -> anyhow::Result<SyncStateRow> {
        if let Some(row) = self.search_one(key).await? {
            return Ok(row);
        }

        let values = json!({
            "user_id": key.user_id.value(),
            "device_id": key.device_id.as_str(),
            "app_profile": key.app_profile.as_str(),
            "last_event_id": 0,
            "sync_count": 0,
            "total_events_synced": 0,
            "is_active": true,
        });

        let result = self
            .client
            .call(SYNC_STATE_MODEL, "create", vec![values], Map::new())
            .await
            .context("sync-state create failed")?;

        let id = result
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("sync-state create returned no id"))?;

        debug!(row_id = id, device = %key.device_id, "Created sync-state row");
        Ok(SyncStateRow::fresh(id, key.clone()))
    }

    async fn find(&self, key: &SyncKey) -> anyhow::Result<Option<SyncStateRow>> {
        self.search_one(key).await
    }

    async fn advance(
        &self,
        row_id: i64,
        new_last_event_id: EventId,
        events_added: u64,
    ) -> anyhow::Result<SyncStateRow> {
        let mut row = self
            .read_by_id(row_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("sync-state row {row_id} not found"))?;

        row.apply_advance(new_last_event_id, events_added);

        let values = json!({
            "last_event_id": row.last_event_id.value(),
            "last_sync_time": row
                .last_sync_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            "sync_count": row.sync_count,
            "total_events_synced": row.total_events_synced,
        });

        self.client
            .call(
                SYNC_STATE_MODEL,
                "write",
                vec![json!([row_id]), values],
                Map::new(),
            )
            .await
            .context("sync-state write failed")?;

        Ok(row)
    }

    async fn reset(&self, key: &SyncKey) -> anyhow::Result<()> {
        let Some(row) = self.search_one(key).await? else {
            return Ok(());
        };

        self.client
            .call(
                SYNC_STATE_MODEL,
                "write",
                vec![json!([row.id]), json!({"last_event_id": 0, "sync_count": 0})],
                Map::new(),
            )
            .await
            .context("sync-state reset failed")?;

        debug!(row_id = row.id, device = %key.device_id, "Reset sync-state row");
        Ok(())
    }
}

/// Timestamps arrive as RFC 3339 or `%Y-%m-%d %H:%M:%S`, or `false` for NULL
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
