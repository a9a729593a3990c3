//! Change-log events
//!
//! The upstream's append-only change log emits one event per record
//! mutation. `event_id` is the sole ordering key; no two events share an id.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::newtypes::EventId;

/// What happened to the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Update,
    Delete,
    /// Emitted by hand (backfills, repairs)
    Manual,
}

impl EventKind {
    /// Parse from the upstream's event names
    ///
    /// The upstream uses its method names (`write`, `unlink`) in older rows;
    /// both spellings are accepted.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(EventKind::Create),
            "update" | "write" => Some(EventKind::Update),
            "delete" | "unlink" => Some(EventKind::Delete),
            "manual" => Some(EventKind::Manual),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Manual => "manual",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority assigned by the upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// Processing status of an event in the upstream's delivery machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    /// Exhausted retries; parked in the dead-letter set
    Dead,
}

/// One event from the upstream change log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: EventId,
    pub model: String,
    pub record_id: i64,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<String>,
    /// Opaque record snapshot, when the log carries one
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub changed_fields: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<ProcessingStatus>,
    #[serde(default)]
    pub retry_count: u32,
}

impl ChangeEvent {
    /// Shorthand constructor for tests and internal producers
    pub fn new(event_id: impl Into<EventId>, model: impl Into<String>, record_id: i64, kind: EventKind) -> Self {
        Self {
            event_id: event_id.into(),
            model: model.into(),
            record_id,
            kind,
            timestamp: Utc::now(),
            priority: None,
            category: None,
            payload: None,
            changed_fields: None,
            status: None,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_accepts_upstream_spellings() {
        assert_eq!(EventKind::parse("write"), Some(EventKind::Update));
        assert_eq!(EventKind::parse("unlink"), Some(EventKind::Delete));
        assert_eq!(EventKind::parse("create"), Some(EventKind::Create));
        assert_eq!(EventKind::parse("touch"), None);
    }

    #[test]
    fn test_event_serde_defaults() {
        let event: ChangeEvent = serde_json::from_value(serde_json::json!({
            "event_id": 101,
            "model": "sale.order",
            "record_id": 7,
            "kind": "update",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(event.event_id, EventId::new(101));
        assert!(event.payload.is_none());
        assert_eq!(event.retry_count, 0);
    }
}
