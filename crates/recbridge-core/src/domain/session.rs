//! Upstream session state
//!
//! One authenticated session per (tenant, upstream) pair, owned exclusively
//! by the upstream client instance that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::UserId;

/// Result of a successful upstream authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The upstream-assigned user id of the service login
    pub uid: UserId,
    /// Opaque session cookie value
    pub session_id: String,
    /// When the session was established
    pub created_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(uid: UserId, session_id: impl Into<String>) -> Self {
        Self {
            uid,
            session_id: session_id.into(),
            created_at: Utc::now(),
        }
    }
}
