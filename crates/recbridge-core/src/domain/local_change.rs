//! Offline-sync upload units
//!
//! Disconnected clients buffer mutations locally and upload them as a batch
//! of [`LocalChange`]s. This module holds the upload types plus the pure
//! pieces of the push algorithm: dependency ordering and placeholder
//! resolution.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::DomainError;

/// Prefix a value must carry to be treated as a local-id placeholder
const LOCAL_ID_PREFIX: &str = "local_";

/// Action of a buffered client mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

/// Strategy applied when an update collides with a newer server write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Skip the local change; the server copy stands
    #[default]
    ServerWins,
    /// Write anyway
    ClientWins,
    /// Return the conflict for explicit resolution
    Manual,
    /// Write only when the local change is at least as recent
    NewestWins,
    /// Write explicitly merged values; only valid in the resolve endpoint
    Merge,
}

/// Outcome status of one processed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
    Conflict,
}

/// One buffered client mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalChange {
    /// Client-assigned id, stable across retries
    pub local_id: String,
    pub action: SyncAction,
    pub model: String,
    /// Server record id; required for update/delete, absent for create
    #[serde(default)]
    pub record_id: Option<i64>,
    /// Field values; strings starting with `local_` refer to other changes
    #[serde(default, alias = "values")]
    pub data: Map<String, Value>,
    /// When the client recorded the mutation
    pub local_timestamp: DateTime<Utc>,
    /// Client record version; `> 1` arms server-side conflict detection
    #[serde(default = "default_version")]
    pub version: u32,
    /// Local ids that must be applied before this change
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Higher first within a dependency level
    #[serde(default)]
    pub priority: Option<i32>,
}

fn default_version() -> u32 {
    1
}

/// Per-change result returned to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushResult {
    pub local_id: String,
    pub status: SyncStatus,
    pub action: SyncAction,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictRecord>,
    #[serde(default)]
    pub processing_time_ms: f64,
}

/// Full descriptor of a detected update conflict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub local_id: String,
    pub model: String,
    pub server_id: i64,
    /// The strategy that produced this record
    pub strategy: ConflictStrategy,
    /// How the conflict was handled (`skipped`, `overwritten`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    /// Whether the client must call the resolve endpoint
    #[serde(default)]
    pub requires_resolution: bool,
    pub local_data: Map<String, Value>,
    #[serde(default)]
    pub server_data: Map<String, Value>,
    pub local_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Fields present in both value sets with differing server values
    #[serde(default)]
    pub conflicting_fields: Vec<String>,
}

// ============================================================================
// Dependency ordering
// ============================================================================

/// Order changes so every dependency precedes its dependents
///
/// Kahn's algorithm over the `dependencies` edges. Within a topological
/// level, higher `priority` first, then older `local_timestamp` first.
/// Dependencies naming unknown local ids are ignored (the change may have
/// been synced in an earlier push). A cycle fails the whole batch.
pub fn sort_by_dependencies(changes: Vec<LocalChange>) -> Result<Vec<LocalChange>, DomainError> {
    let ids: HashSet<&str> = changes.iter().map(|c| c.local_id.as_str()).collect();
    if ids.len() != changes.len() {
        return Err(DomainError::ValidationFailed(
            "duplicate local_id in push batch".into(),
        ));
    }

    let index: HashMap<&str, usize> = changes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.local_id.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; changes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); changes.len()];
    for (i, change) in changes.iter().enumerate() {
        for dep in &change.dependencies {
            if let Some(&d) = index.get(dep.as_str()) {
                indegree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    // Each queue round is one topological level, sorted before draining.
    let mut ready: Vec<usize> = (0..changes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut ordered_indices = Vec::with_capacity(changes.len());
    let mut queue = VecDeque::new();

    while !ready.is_empty() {
        ready.sort_by(|&a, &b| {
            let pa = changes[a].priority.unwrap_or(0);
            let pb = changes[b].priority.unwrap_or(0);
            pb.cmp(&pa)
                .then(changes[a].local_timestamp.cmp(&changes[b].local_timestamp))
        });
        queue.extend(ready.drain(..));

        while let Some(i) = queue.pop_front() {
            ordered_indices.push(i);
            for &j in &dependents[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 {
                    ready.push(j);
                }
            }
        }
    }

    if ordered_indices.len() != changes.len() {
        return Err(DomainError::ValidationFailed(
            "dependency cycle in push batch".into(),
        ));
    }

    let mut slots: Vec<Option<LocalChange>> = changes.into_iter().map(Some).collect();
    Ok(ordered_indices
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

// ============================================================================
// Placeholder resolution
// ============================================================================

/// Replace `local_*` placeholder strings with mapped server ids
///
/// Walks the value tree recursively; maps, arrays, and nested maps inside
/// arrays are all visited. Placeholders with no mapping keep their literal
/// value (the upstream will reject them with a useful message).
pub fn resolve_placeholders(data: &Map<String, Value>, mapping: &HashMap<String, i64>) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, mapping)))
        .collect()
}

fn resolve_value(value: &Value, mapping: &HashMap<String, i64>) -> Value {
    match value {
        // The mapping is keyed by bare local ids; the placeholder carries
        // the prefix on the wire.
        Value::String(s) if s.starts_with(LOCAL_ID_PREFIX) => mapping
            .get(&s[LOCAL_ID_PREFIX.len()..])
            .map(|id| Value::from(*id))
            .unwrap_or_else(|| value.clone()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, mapping)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, mapping)).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn change(local_id: &str, deps: &[&str], ts_secs: i64, priority: Option<i32>) -> LocalChange {
        LocalChange {
            local_id: local_id.to_string(),
            action: SyncAction::Create,
            model: "res.partner".to_string(),
            record_id: None,
            data: Map::new(),
            local_timestamp: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            version: 1,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            priority,
        }
    }

    #[test]
    fn test_sort_respects_dependencies() {
        let sorted = sort_by_dependencies(vec![
            change("L2", &["L1"], 1, None),
            change("L1", &[], 2, None),
        ])
        .unwrap();
        assert_eq!(sorted[0].local_id, "L1");
        assert_eq!(sorted[1].local_id, "L2");
    }

    #[test]
    fn test_sort_level_order_by_priority_then_time() {
        let sorted = sort_by_dependencies(vec![
            change("A", &[], 30, None),
            change("B", &[], 10, None),
            change("C", &[], 20, Some(5)),
        ])
        .unwrap();
        // C has highest priority; A and B tie on priority, older first.
        assert_eq!(sorted[0].local_id, "C");
        assert_eq!(sorted[1].local_id, "B");
        assert_eq!(sorted[2].local_id, "A");
    }

    #[test]
    fn test_sort_detects_cycle() {
        let err = sort_by_dependencies(vec![
            change("L1", &["L2"], 1, None),
            change("L2", &["L1"], 2, None),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_sort_ignores_unknown_dependency() {
        let sorted = sort_by_dependencies(vec![change("L1", &["already-synced"], 1, None)]).unwrap();
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn test_sort_rejects_duplicate_ids() {
        assert!(sort_by_dependencies(vec![change("L1", &[], 1, None), change("L1", &[], 2, None)])
            .is_err());
    }

    #[test]
    fn test_resolve_placeholders_nested() {
        // Keyed by the bare local id, the way successful creates record it.
        let mut mapping = HashMap::new();
        mapping.insert("L1".to_string(), 42i64);

        let data: Map<String, Value> = serde_json::from_value(json!({
            "partner_id": "local_L1",
            "note": "local_unknown",
            "lines": [{"order_id": "local_L1"}, "local_L1", 3],
            "nested": {"ref": "local_L1"}
        }))
        .unwrap();

        let resolved = resolve_placeholders(&data, &mapping);
        assert_eq!(resolved["partner_id"], json!(42));
        assert_eq!(resolved["note"], json!("local_unknown"));
        assert_eq!(resolved["lines"], json!([{"order_id": 42}, 42, 3]));
        assert_eq!(resolved["nested"], json!({"ref": 42}));
    }

    #[test]
    fn test_local_change_deserialization_defaults() {
        let change: LocalChange = serde_json::from_value(json!({
            "local_id": "L1",
            "action": "create",
            "model": "res.partner",
            "data": {"name": "New Co"},
            "local_timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(change.version, 1);
        assert!(change.dependencies.is_empty());
        assert!(change.record_id.is_none());
    }
}
