//! Tenant entity and lifecycle
//!
//! A tenant binds an API namespace to one upstream instance and carries the
//! credentials, resource limits, and model allowlist the gateway enforces on
//! every request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::TenantId;

/// Lifecycle status of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Trial,
    /// All gateway traffic is blocked (403)
    Suspended,
    /// Terminal; requests answer 410
    Deleted,
}

impl TenantStatus {
    /// Whether gateway traffic is admitted in this status
    #[must_use]
    pub fn admits_traffic(&self) -> bool {
        matches!(self, TenantStatus::Active | TenantStatus::Trial)
    }
}

/// Connection credentials for a tenant's upstream instance
///
/// The secret is stored encrypted by the control plane; this service treats
/// it as an opaque string and never logs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamCredentials {
    /// Base URL of the upstream instance
    pub url: String,
    /// Database name within the upstream
    pub database: String,
    /// Login name
    pub login: String,
    /// Opaque encrypted secret
    pub secret: String,
}

/// Per-tenant resource limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TenantLimits {
    pub requests_per_day: u64,
    pub requests_per_hour: u64,
    pub max_users: u32,
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self {
            requests_per_day: 10_000,
            requests_per_hour: 1_000,
            max_users: 50,
        }
    }
}

/// A tenant of the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub credentials: UpstreamCredentials,
    #[serde(default)]
    pub limits: TenantLimits,
    /// Models this tenant may touch; empty means all models
    #[serde(default)]
    pub allowed_models: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Updated on every request traversal
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
}

impl Tenant {
    /// Create an active tenant with default limits and an open allowlist
    pub fn new(name: impl Into<String>, credentials: UpstreamCredentials) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            status: TenantStatus::Active,
            credentials,
            limits: TenantLimits::default(),
            allowed_models: Vec::new(),
            created_at: Utc::now(),
            last_active: None,
        }
    }

    /// Whether the allowlist admits `model` (empty allowlist admits all)
    #[must_use]
    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> UpstreamCredentials {
        UpstreamCredentials {
            url: "https://upstream.example.com".into(),
            database: "prod".into(),
            login: "svc".into(),
            secret: "enc:abc".into(),
        }
    }

    #[test]
    fn test_status_traffic_admission() {
        assert!(TenantStatus::Active.admits_traffic());
        assert!(TenantStatus::Trial.admits_traffic());
        assert!(!TenantStatus::Suspended.admits_traffic());
        assert!(!TenantStatus::Deleted.admits_traffic());
    }

    #[test]
    fn test_empty_allowlist_admits_everything() {
        let tenant = Tenant::new("acme", credentials());
        assert!(tenant.is_model_allowed("res.partner"));
        assert!(tenant.is_model_allowed("anything.else"));
    }

    #[test]
    fn test_allowlist_restricts() {
        let mut tenant = Tenant::new("acme", credentials());
        tenant.allowed_models = vec!["sale.order".into(), "res.partner".into()];
        assert!(tenant.is_model_allowed("sale.order"));
        assert!(!tenant.is_model_allowed("account.move"));
    }
}
