//! Record writer port (driven/secondary port)
//!
//! The narrow CRUD surface the offline-sync use cases need. The gateway
//! implements this trait on top of its full pipeline, so every write made
//! during a push also invalidates caches and fans out change events exactly
//! like a direct RPC write would.

use serde_json::{Map, Value};

use crate::domain::errors::GatewayError;
use crate::domain::newtypes::TenantId;

/// Port trait for tenant-scoped record CRUD
#[async_trait::async_trait]
pub trait IRecordWriter: Send + Sync {
    /// Create a record, returning its server id
    async fn create(
        &self,
        tenant: &TenantId,
        model: &str,
        values: Map<String, Value>,
    ) -> Result<i64, GatewayError>;

    /// Update records by id
    async fn write(
        &self,
        tenant: &TenantId,
        model: &str,
        ids: &[i64],
        values: Map<String, Value>,
    ) -> Result<bool, GatewayError>;

    /// Delete records by id
    async fn unlink(&self, tenant: &TenantId, model: &str, ids: &[i64])
        -> Result<bool, GatewayError>;

    /// Read selected fields of records by id
    async fn read(
        &self,
        tenant: &TenantId,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<Map<String, Value>>, GatewayError>;
}
