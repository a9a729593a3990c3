//! Event broadcast port (driven/secondary port)
//!
//! Fire-and-forget delivery of mutation events to interested subscribers.
//! Nothing here persists; a dropped delivery is acceptable because clients
//! recover through the pull protocol and de-duplicate by event id.

use serde_json::Value;

use crate::domain::change_event::EventKind;
use crate::domain::newtypes::TenantId;

/// Port trait for best-effort event fan-out
#[async_trait::async_trait]
pub trait IEventBroadcaster: Send + Sync {
    /// Deliver a record mutation to users subscribed to that record
    async fn broadcast_record_update(
        &self,
        tenant: &TenantId,
        model: &str,
        record_id: i64,
        kind: EventKind,
        payload: Value,
    );

    /// Deliver a message to every user subscribed to a named channel
    async fn broadcast_to_channel(&self, channel: &str, message: Value);
}

/// A broadcaster that drops everything; used where fan-out is not wired
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBroadcaster;

#[async_trait::async_trait]
impl IEventBroadcaster for NullBroadcaster {
    async fn broadcast_record_update(
        &self,
        _tenant: &TenantId,
        _model: &str,
        _record_id: i64,
        _kind: EventKind,
        _payload: Value,
    ) {
    }

    async fn broadcast_to_channel(&self, _channel: &str, _message: Value) {}
}
