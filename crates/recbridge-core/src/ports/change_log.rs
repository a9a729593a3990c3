//! Change-log reader port (driven/secondary port)
//!
//! Read access to the upstream's append-only change log. The reader never
//! mutates events; acknowledgements go through the dedicated methods, which
//! the pull engine invokes best-effort after advancing a watermark.

use serde::{Deserialize, Serialize};

use crate::domain::change_event::{ChangeEvent, Priority, ProcessingStatus};
use crate::domain::newtypes::{EventId, UserId};

/// Sort order of a change-log read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeLogOrder {
    /// `event_id ASC` - watermark advancement
    EventIdAsc,
    /// `timestamp DESC` - recent-activity listings
    TimestampDesc,
}

/// A bounded read of the change log
#[derive(Debug, Clone)]
pub struct ChangeLogQuery {
    /// Only events with `event_id` strictly greater than this cursor
    pub after: EventId,
    /// Restrict to these models (`None` = all)
    pub models: Option<Vec<String>>,
    /// Restrict to these priorities (`None` = all)
    pub priorities: Option<Vec<Priority>>,
    /// Restrict to one processing status
    pub status: Option<ProcessingStatus>,
    /// Whether archived events are included (pulls never include them)
    pub include_archived: bool,
    pub order: ChangeLogOrder,
    /// Batch bound; implementations additionally cap at 1000
    pub limit: u32,
    pub offset: u32,
}

impl ChangeLogQuery {
    /// A watermark-advancing query after `cursor`
    pub fn after(cursor: EventId) -> Self {
        Self {
            after: cursor,
            models: None,
            priorities: None,
            status: None,
            include_archived: false,
            order: ChangeLogOrder::EventIdAsc,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_models(mut self, models: Option<Vec<String>>) -> Self {
        self.models = models;
        self
    }

    pub fn with_priorities(mut self, priorities: Option<Vec<Priority>>) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Port trait for reading the upstream change log
#[async_trait::async_trait]
pub trait IChangeLogReader: Send + Sync {
    /// Fetch a batch of events matching the query
    async fn fetch(&self, query: &ChangeLogQuery) -> anyhow::Result<Vec<ChangeEvent>>;

    /// Count events matching the query (ignoring limit/offset)
    async fn count(&self, query: &ChangeLogQuery) -> anyhow::Result<u64>;

    /// Mark events as processed in the upstream's delivery machinery
    async fn acknowledge(&self, event_ids: &[EventId]) -> anyhow::Result<()>;

    /// Record that a user's device has synced these events (analytics)
    async fn mark_synced_by_user(&self, event_ids: &[EventId], user_id: UserId)
        -> anyhow::Result<()>;
}
