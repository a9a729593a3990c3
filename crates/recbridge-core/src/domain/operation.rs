//! The closed set of gateway operations
//!
//! Every request through the RPC gateway names one of these operations.
//! Anything outside the set is rejected before the upstream is contacted.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::change_event::EventKind;
use super::errors::DomainError;
use super::predicate::SearchDomain;

/// A gateway operation from the closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    // Read family (cacheable)
    Search,
    SearchRead,
    SearchCount,
    Read,
    NameSearch,
    NameGet,
    FieldsGet,
    WebSearchRead,
    WebRead,
    // Write family
    Create,
    Write,
    Unlink,
    WebSave,
    // Passthrough
    CallKw,
}

/// All operations, in a stable order
pub const ALL_OPERATIONS: &[OperationKind] = &[
    OperationKind::Search,
    OperationKind::SearchRead,
    OperationKind::SearchCount,
    OperationKind::Read,
    OperationKind::NameSearch,
    OperationKind::NameGet,
    OperationKind::FieldsGet,
    OperationKind::WebSearchRead,
    OperationKind::WebRead,
    OperationKind::Create,
    OperationKind::Write,
    OperationKind::Unlink,
    OperationKind::WebSave,
    OperationKind::CallKw,
];

/// The cacheable read operations, used to derive invalidation patterns
pub const CACHEABLE_OPERATIONS: &[OperationKind] = &[
    OperationKind::Search,
    OperationKind::SearchRead,
    OperationKind::SearchCount,
    OperationKind::Read,
    OperationKind::NameSearch,
    OperationKind::NameGet,
    OperationKind::FieldsGet,
    OperationKind::WebSearchRead,
    OperationKind::WebRead,
];

impl OperationKind {
    /// Wire name of the operation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Search => "search",
            OperationKind::SearchRead => "search_read",
            OperationKind::SearchCount => "search_count",
            OperationKind::Read => "read",
            OperationKind::NameSearch => "name_search",
            OperationKind::NameGet => "name_get",
            OperationKind::FieldsGet => "fields_get",
            OperationKind::WebSearchRead => "web_search_read",
            OperationKind::WebRead => "web_read",
            OperationKind::Create => "create",
            OperationKind::Write => "write",
            OperationKind::Unlink => "unlink",
            OperationKind::WebSave => "web_save",
            OperationKind::CallKw => "call_kw",
        }
    }

    /// The upstream method this operation forwards to
    ///
    /// `web_*` operations are gateway aliases for the plain methods; the
    /// passthrough carries its own method name in the request.
    #[must_use]
    pub fn upstream_method(&self) -> &'static str {
        match self {
            OperationKind::WebSearchRead => "search_read",
            OperationKind::WebRead => "read",
            OperationKind::WebSave => "write",
            other => other.as_str(),
        }
    }

    /// Whether results of this operation may be cached
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        CACHEABLE_OPERATIONS.contains(self)
    }

    /// Whether this operation mutates upstream state
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OperationKind::Create
                | OperationKind::Write
                | OperationKind::Unlink
                | OperationKind::WebSave
        )
    }

    /// The change kind a successful write of this operation broadcasts
    #[must_use]
    pub fn event_kind(&self) -> Option<EventKind> {
        match self {
            OperationKind::Create => Some(EventKind::Create),
            OperationKind::Write | OperationKind::WebSave => Some(EventKind::Update),
            OperationKind::Unlink => Some(EventKind::Delete),
            _ => None,
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_OPERATIONS
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| DomainError::UnknownOperation(s.to_string()))
    }
}

// ============================================================================
// OperationCall
// ============================================================================

/// A fully parsed tenant-scoped operation request
///
/// This is the value the gateway pipeline works on. It is read-only once
/// built; the optimizer produces rewritten copies of individual parts.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationCall {
    /// Target model (opaque to the gateway)
    pub model: String,
    /// Record ids for `read`/`write`/`unlink`
    #[serde(default)]
    pub ids: Vec<i64>,
    /// Search predicate for the search family
    #[serde(default)]
    pub domain: Option<SearchDomain>,
    /// Requested fields, `None` meaning all
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    /// Sort order string (e.g. `"id DESC"`)
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
    /// Field values for `create`/`write`/`web_save`
    #[serde(default)]
    pub values: Option<Map<String, Value>>,
    /// Name fragment for `name_search`
    #[serde(default)]
    pub name: Option<String>,
    /// Explicit method for `call_kw`
    #[serde(default)]
    pub method: Option<String>,
    /// Positional args for `call_kw`
    #[serde(default)]
    pub args: Vec<Value>,
    /// Free-form keyword args merged into the upstream call
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl OperationCall {
    /// Minimal constructor used by internal callers (offline push)
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ids: Vec::new(),
            domain: None,
            fields: None,
            order: None,
            limit: None,
            offset: None,
            values: None,
            name: None,
            method: None,
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    /// Validate the call against what the operation requires
    pub fn validate_for(&self, op: OperationKind) -> Result<(), DomainError> {
        if self.model.is_empty() {
            return Err(DomainError::ValidationFailed("model is required".into()));
        }
        match op {
            OperationKind::Read | OperationKind::WebRead if self.ids.is_empty() => Err(
                DomainError::ValidationFailed("ids are required for read".into()),
            ),
            OperationKind::Write | OperationKind::WebSave | OperationKind::Unlink
                if self.ids.is_empty() =>
            {
                Err(DomainError::ValidationFailed(format!(
                    "ids are required for {op}"
                )))
            }
            OperationKind::Create | OperationKind::Write | OperationKind::WebSave
                if self.values.is_none() =>
            {
                Err(DomainError::ValidationFailed(format!(
                    "values are required for {op}"
                )))
            }
            OperationKind::CallKw if self.method.is_none() => Err(DomainError::ValidationFailed(
                "method is required for call_kw".into(),
            )),
            _ => Ok(()),
        }
    }
}
