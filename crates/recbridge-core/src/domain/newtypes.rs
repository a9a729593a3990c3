//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers that flow through the gateway
//! and sync plane. Each newtype ensures validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// TenantId
// ============================================================================

/// Identifier for a tenant (UUID, issued by the control plane)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create a new random TenantId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a TenantId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid TenantId: {e}")))
    }
}

impl From<Uuid> for TenantId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// UserId
// ============================================================================

/// Identifier for a user inside the upstream (integer, upstream-assigned)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// DeviceId
// ============================================================================

/// Maximum accepted length of a device identifier
const DEVICE_ID_MAX_LEN: usize = 128;

/// Opaque, client-chosen device identifier
///
/// Non-empty, at most 128 characters. Part of the sync-state key together
/// with the user id and the app profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId, validating length and content
    pub fn new(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(DomainError::InvalidId("device id must not be empty".into()));
        }
        if raw.len() > DEVICE_ID_MAX_LEN {
            return Err(DomainError::InvalidId(format!(
                "device id exceeds {DEVICE_ID_MAX_LEN} characters"
            )));
        }
        Ok(Self(raw))
    }

    /// The raw string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

// ============================================================================
// EventId
// ============================================================================

/// Monotone change-log event identifier
///
/// The sole ordering key of the change log: strictly increasing within one
/// upstream instance. `EventId::ZERO` is the watermark of a device that has
/// never synced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    /// Watermark of a device that has never pulled
    pub const ZERO: EventId = EventId(0);

    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EventId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// AppProfile
// ============================================================================

/// Named set of upstream models a client application cares about
///
/// Governs delta-pull filtering: a pull without an explicit model filter is
/// restricted to the profile's model set. Unknown profiles carry an empty
/// set, which means "no profile filtering".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppProfile {
    SalesApp,
    DeliveryApp,
    WarehouseApp,
    ManagerApp,
    MobileApp,
    /// A profile name this gateway has no model set for
    Other(String),
}

impl AppProfile {
    /// The models this profile subscribes to (empty for unknown profiles)
    #[must_use]
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            AppProfile::SalesApp => &[
                "sale.order",
                "sale.order.line",
                "res.partner",
                "product.template",
                "product.product",
                "product.category",
            ],
            AppProfile::DeliveryApp => &[
                "stock.picking",
                "stock.move",
                "stock.move.line",
                "res.partner",
            ],
            AppProfile::WarehouseApp => &[
                "stock.picking",
                "stock.move",
                "stock.move.line",
                "stock.quant",
                "product.product",
                "stock.location",
            ],
            AppProfile::ManagerApp => &[
                "sale.order",
                "purchase.order",
                "account.move",
                "res.partner",
                "hr.expense",
                "project.project",
            ],
            AppProfile::MobileApp => &[
                "sale.order",
                "res.partner",
                "product.template",
                "product.product",
            ],
            AppProfile::Other(_) => &[],
        }
    }

    /// The canonical profile name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            AppProfile::SalesApp => "sales_app",
            AppProfile::DeliveryApp => "delivery_app",
            AppProfile::WarehouseApp => "warehouse_app",
            AppProfile::ManagerApp => "manager_app",
            AppProfile::MobileApp => "mobile_app",
            AppProfile::Other(name) => name,
        }
    }
}

impl Display for AppProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for AppProfile {
    fn from(value: String) -> Self {
        match value.as_str() {
            "sales_app" => AppProfile::SalesApp,
            "delivery_app" => AppProfile::DeliveryApp,
            "warehouse_app" => AppProfile::WarehouseApp,
            "manager_app" => AppProfile::ManagerApp,
            "mobile_app" => AppProfile::MobileApp,
            _ => AppProfile::Other(value),
        }
    }
}

impl From<&str> for AppProfile {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<AppProfile> for String {
    fn from(profile: AppProfile) -> Self {
        profile.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_id_roundtrip() {
        let id = TenantId::new();
        let parsed: TenantId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_tenant_id_rejects_garbage() {
        assert!("not-a-uuid".parse::<TenantId>().is_err());
    }

    #[test]
    fn test_device_id_validation() {
        assert!(DeviceId::new("d-1").is_ok());
        assert!(DeviceId::new("").is_err());
        assert!(DeviceId::new("x".repeat(200)).is_err());
    }

    #[test]
    fn test_event_id_ordering() {
        assert!(EventId::new(101) < EventId::new(102));
        assert_eq!(EventId::ZERO.value(), 0);
    }

    #[test]
    fn test_app_profile_parse_known() {
        let profile = AppProfile::from("sales_app");
        assert_eq!(profile, AppProfile::SalesApp);
        assert!(profile.models().contains(&"sale.order"));
        assert_eq!(profile.models().len(), 6);
    }

    #[test]
    fn test_app_profile_parse_unknown_has_no_models() {
        let profile = AppProfile::from("kiosk_app");
        assert_eq!(profile.as_str(), "kiosk_app");
        assert!(profile.models().is_empty());
    }

    #[test]
    fn test_app_profile_serde_as_string() {
        let json = serde_json::to_string(&AppProfile::WarehouseApp).unwrap();
        assert_eq!(json, "\"warehouse_app\"");
        let back: AppProfile = serde_json::from_str("\"delivery_app\"").unwrap();
        assert_eq!(back, AppProfile::DeliveryApp);
    }
}
