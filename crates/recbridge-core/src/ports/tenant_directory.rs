//! Tenant directory port (driven/secondary port)
//!
//! Lookup of tenant records by id. The authoritative tenant store (admin
//! CRUD, billing plans) lives outside this service; the core only consumes
//! this narrow read-and-touch interface.

use crate::domain::newtypes::TenantId;
use crate::domain::tenant::Tenant;

/// Port trait for tenant lookup
#[async_trait::async_trait]
pub trait ITenantDirectory: Send + Sync {
    /// Fetch a tenant by id, `None` when unknown
    async fn get(&self, id: &TenantId) -> anyhow::Result<Option<Tenant>>;

    /// Record request traversal time for the tenant
    async fn touch_last_active(&self, id: &TenantId) -> anyhow::Result<()>;

    /// Insert or replace a tenant record
    ///
    /// Used by provisioning tooling and tests; the gateway itself never
    /// mutates tenants.
    async fn upsert(&self, tenant: &Tenant) -> anyhow::Result<()>;
}
