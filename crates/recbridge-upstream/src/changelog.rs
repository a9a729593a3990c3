//! Change-log reader
//!
//! Reads the upstream's append-only change table through the RPC client
//! using a fixed search-and-read recipe. The reader never mutates events;
//! `acknowledge` and `mark_synced_by_user` invoke upstream methods that own
//! the status transitions.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use recbridge_core::domain::change_event::{ChangeEvent, EventKind, Priority, ProcessingStatus};
use recbridge_core::domain::newtypes::{EventId, UserId};
use recbridge_core::domain::predicate::SearchDomain;
use recbridge_core::ports::change_log::{ChangeLogOrder, ChangeLogQuery, IChangeLogReader};
use recbridge_core::ports::upstream::IUpstreamClient;

/// Model name of the change log in the upstream
const CHANGE_LOG_MODEL: &str = "change.log";

/// Hard cap on one change-log read
const MAX_BATCH: u32 = 1000;

/// Columns fetched for every event
const EVENT_FIELDS: &[&str] = &[
    "id",
    "model",
    "record_id",
    "event",
    "timestamp",
    "payload",
    "changed_fields",
    "priority",
    "category",
    "status",
    "retry_count",
];

/// Reader over the upstream change log
pub struct ChangeLogReader {
    client: Arc<dyn IUpstreamClient>,
}

impl ChangeLogReader {
    pub fn new(client: Arc<dyn IUpstreamClient>) -> Self {
        Self { client }
    }

    /// Build the search predicate for a query
    fn domain_for(query: &ChangeLogQuery) -> SearchDomain {
        let mut domain = SearchDomain::empty();
        domain.push_leaf("id", ">", json!(query.after.value()));

        if !query.include_archived {
            domain.push_leaf("is_archived", "=", json!(false));
        }
        if let Some(models) = &query.models {
            domain.push_leaf("model", "in", json!(models));
        }
        if let Some(priorities) = &query.priorities {
            let names: Vec<&str> = priorities.iter().map(Priority::as_str).collect();
            domain.push_leaf("priority", "in", json!(names));
        }
        if let Some(status) = &query.status {
            domain.push_leaf("status", "=", json!(status_name(status)));
        }
        domain
    }

    fn order_for(query: &ChangeLogQuery) -> &'static str {
        match query.order {
            ChangeLogOrder::EventIdAsc => "id asc",
            ChangeLogOrder::TimestampDesc => "timestamp desc",
        }
    }
}

#[async_trait::async_trait]
impl IChangeLogReader for ChangeLogReader {
    async fn fetch(&self, query: &ChangeLogQuery) -> anyhow::Result<Vec<ChangeEvent>> {
        let mut kwargs = Map::new();
        kwargs.insert("domain".to_string(), Self::domain_for(query).to_json());
        kwargs.insert("fields".to_string(), json!(EVENT_FIELDS));
        kwargs.insert("limit".to_string(), json!(query.limit.min(MAX_BATCH)));
        kwargs.insert("offset".to_string(), json!(query.offset));
        kwargs.insert("order".to_string(), json!(Self::order_for(query)));

        let result = self
            .client
            .call(CHANGE_LOG_MODEL, "search_read", Vec::new(), kwargs)
            .await
            .context("change-log search_read failed")?;

        let rows = result
            .as_array()
            .cloned()
            .unwrap_or_default();

        debug!(rows = rows.len(), after = %query.after, "Fetched change-log batch");

        Ok(rows.iter().filter_map(parse_event).collect())
    }

    async fn count(&self, query: &ChangeLogQuery) -> anyhow::Result<u64> {
        let mut kwargs = Map::new();
        kwargs.insert("domain".to_string(), Self::domain_for(query).to_json());

        let result = self
            .client
            .call(CHANGE_LOG_MODEL, "search_count", Vec::new(), kwargs)
            .await
            .context("change-log search_count failed")?;

        Ok(result.as_u64().unwrap_or(0))
    }

    async fn acknowledge(&self, event_ids: &[EventId]) -> anyhow::Result<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = event_ids.iter().map(EventId::value).collect();
        self.client
            .call(
                CHANGE_LOG_MODEL,
                "acknowledge",
                vec![json!(ids)],
                Map::new(),
            )
            .await
            .context("change-log acknowledge failed")?;
        Ok(())
    }

    async fn mark_synced_by_user(
        &self,
        event_ids: &[EventId],
        user_id: UserId,
    ) -> anyhow::Result<()> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = event_ids.iter().map(EventId::value).collect();
        self.client
            .call(
                CHANGE_LOG_MODEL,
                "mark_as_synced_by_user",
                vec![json!(ids), json!(user_id.value())],
                Map::new(),
            )
            .await
            .context("change-log mark_as_synced_by_user failed")?;
        Ok(())
    }
}

/// Map one upstream row to a [`ChangeEvent`]; malformed rows are dropped
fn parse_event(row: &Value) -> Option<ChangeEvent> {
    let event_id = row.get("id").and_then(Value::as_i64)?;
    let model = row.get("model").and_then(Value::as_str)?.to_string();
    let record_id = row.get("record_id").and_then(Value::as_i64).unwrap_or(0);
    let kind = row
        .get("event")
        .and_then(Value::as_str)
        .and_then(EventKind::parse)
        .unwrap_or(EventKind::Manual);

    let timestamp = row
        .get("timestamp")
        .and_then(parse_timestamp)
        .unwrap_or_else(Utc::now);

    Some(ChangeEvent {
        event_id: EventId::new(event_id),
        model,
        record_id,
        kind,
        timestamp,
        priority: row
            .get("priority")
            .and_then(Value::as_str)
            .and_then(parse_priority),
        category: non_false(row.get("category"))
            .and_then(Value::as_str)
            .map(str::to_string),
        payload: non_false(row.get("payload")).cloned(),
        changed_fields: non_false(row.get("changed_fields")).and_then(parse_field_list),
        status: row
            .get("status")
            .and_then(Value::as_str)
            .and_then(parse_status),
        retry_count: row
            .get("retry_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
    })
}

/// The upstream encodes SQL NULL as JSON `false`
fn non_false(value: Option<&Value>) -> Option<&Value> {
    match value {
        Some(Value::Bool(false)) | Some(Value::Null) | None => None,
        Some(v) => Some(v),
    }
}

/// Record timestamps arrive as RFC 3339 or `%Y-%m-%d %H:%M:%S`
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_priority(s: &str) -> Option<Priority> {
    match s {
        "high" => Some(Priority::High),
        "medium" => Some(Priority::Medium),
        "low" => Some(Priority::Low),
        _ => None,
    }
}

fn parse_status(s: &str) -> Option<ProcessingStatus> {
    match s {
        "pending" => Some(ProcessingStatus::Pending),
        "processing" => Some(ProcessingStatus::Processing),
        "sent" => Some(ProcessingStatus::Sent),
        "failed" => Some(ProcessingStatus::Failed),
        "dead" => Some(ProcessingStatus::Dead),
        _ => None,
    }
}

fn status_name(status: &ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Pending => "pending",
        ProcessingStatus::Processing => "processing",
        ProcessingStatus::Sent => "sent",
        ProcessingStatus::Failed => "failed",
        ProcessingStatus::Dead => "dead",
    }
}

/// `changed_fields` may arrive as a JSON array or a comma-joined string
fn parse_field_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Value::String(s) => Some(s.split(',').map(|f| f.trim().to_string()).collect()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_full_row() {
        let row = json!({
            "id": 101,
            "model": "sale.order",
            "record_id": 7,
            "event": "write",
            "timestamp": "2024-03-01 10:15:00",
            "payload": {"state": "sale"},
            "changed_fields": ["state"],
            "priority": "high",
            "category": "sales",
            "status": "pending",
            "retry_count": 1
        });

        let event = parse_event(&row).unwrap();
        assert_eq!(event.event_id, EventId::new(101));
        assert_eq!(event.kind, EventKind::Update);
        assert_eq!(event.priority, Some(Priority::High));
        assert_eq!(event.changed_fields.as_deref(), Some(&["state".to_string()][..]));
        assert_eq!(event.status, Some(ProcessingStatus::Pending));
    }

    #[test]
    fn test_parse_event_false_is_null() {
        let row = json!({
            "id": 5,
            "model": "res.partner",
            "record_id": 1,
            "event": "create",
            "timestamp": "2024-03-01T10:15:00Z",
            "payload": false,
            "changed_fields": false,
            "category": false
        });

        let event = parse_event(&row).unwrap();
        assert!(event.payload.is_none());
        assert!(event.changed_fields.is_none());
        assert!(event.category.is_none());
    }

    #[test]
    fn test_parse_event_drops_malformed_rows() {
        assert!(parse_event(&json!({"model": "x"})).is_none());
        assert!(parse_event(&json!({"id": 3})).is_none());
    }

    #[test]
    fn test_changed_fields_comma_string() {
        assert_eq!(
            parse_field_list(&json!("name, email")),
            Some(vec!["name".to_string(), "email".to_string()])
        );
    }

    #[test]
    fn test_domain_shape_for_pull_query() {
        let query = ChangeLogQuery::after(EventId::new(42))
            .with_models(Some(vec!["sale.order".to_string()]))
            .with_priorities(Some(vec![Priority::High]));

        let domain = ChangeLogReader::domain_for(&query).to_json();
        let terms = domain.as_array().unwrap();
        assert_eq!(terms[0], json!(["id", ">", 42]));
        assert_eq!(terms[1], json!(["is_archived", "=", false]));
        assert_eq!(terms[2], json!(["model", "in", ["sale.order"]]));
        assert_eq!(terms[3], json!(["priority", "in", ["high"]]));
    }

    #[test]
    fn test_order_strings() {
        let asc = ChangeLogQuery::after(EventId::ZERO);
        assert_eq!(ChangeLogReader::order_for(&asc), "id asc");

        let mut desc = ChangeLogQuery::after(EventId::ZERO);
        desc.order = ChangeLogOrder::TimestampDesc;
        assert_eq!(ChangeLogReader::order_for(&desc), "timestamp desc");
    }
}
