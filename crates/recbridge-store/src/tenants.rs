//! SQLite implementation of the tenant directory port
//!
//! ## Type Mapping
//!
//! | Domain Type       | SQL Type | Strategy                                |
//! |-------------------|----------|-----------------------------------------|
//! | TenantId          | TEXT     | UUID string via `to_string()`/`FromStr` |
//! | TenantStatus      | TEXT     | lowercase name                          |
//! | allowed_models    | TEXT     | JSON array                              |
//! | DateTime<Utc>     | TEXT     | RFC 3339 via `to_rfc3339()`             |

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use recbridge_core::domain::newtypes::TenantId;
use recbridge_core::domain::tenant::{Tenant, TenantLimits, TenantStatus, UpstreamCredentials};
use recbridge_core::ports::tenant_directory::ITenantDirectory;

use crate::pool::DatabasePool;
use crate::StoreError;

/// SQLite-backed tenant directory
pub struct SqliteTenantDirectory {
    pool: Arc<DatabasePool>,
}

impl SqliteTenantDirectory {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }
}

fn status_to_string(status: TenantStatus) -> &'static str {
    match status {
        TenantStatus::Active => "active",
        TenantStatus::Trial => "trial",
        TenantStatus::Suspended => "suspended",
        TenantStatus::Deleted => "deleted",
    }
}

fn status_from_string(s: &str) -> Result<TenantStatus, StoreError> {
    match s {
        "active" => Ok(TenantStatus::Active),
        "trial" => Ok(TenantStatus::Trial),
        "suspended" => Ok(TenantStatus::Suspended),
        "deleted" => Ok(TenantStatus::Deleted),
        other => Err(StoreError::SerializationError(format!(
            "Unknown tenant status: {other}"
        ))),
    }
}

fn row_to_tenant(row: &SqliteRow) -> Result<Tenant, StoreError> {
    let id_raw: String = row.get("id");
    let id = TenantId::from_str(&id_raw)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    let status = status_from_string(&row.get::<String, _>("status"))?;

    let allowed_models: Vec<String> =
        serde_json::from_str(&row.get::<String, _>("allowed_models"))
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    let created_at = parse_datetime(&row.get::<String, _>("created_at"))?;
    let last_active = row
        .get::<Option<String>, _>("last_active")
        .map(|raw| parse_datetime(&raw))
        .transpose()?;

    Ok(Tenant {
        id,
        name: row.get("name"),
        status,
        credentials: UpstreamCredentials {
            url: row.get("url"),
            database: row.get("database_name"),
            login: row.get("login"),
            secret: row.get("secret"),
        },
        limits: TenantLimits {
            requests_per_day: row.get::<i64, _>("requests_per_day") as u64,
            requests_per_hour: row.get::<i64, _>("requests_per_hour") as u64,
            max_users: row.get::<i64, _>("max_users") as u32,
        },
        allowed_models,
        created_at,
        last_active,
    })
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::SerializationError(format!("Invalid timestamp '{raw}': {e}")))
}

#[async_trait::async_trait]
impl ITenantDirectory for SqliteTenantDirectory {
    async fn get(&self, id: &TenantId) -> anyhow::Result<Option<Tenant>> {
        let row = sqlx::query("SELECT * FROM tenants WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(self.pool.inner())
            .await?;

        row.map(|r| row_to_tenant(&r)).transpose().map_err(Into::into)
    }

    async fn touch_last_active(&self, id: &TenantId) -> anyhow::Result<()> {
        sqlx::query("UPDATE tenants SET last_active = ?2 WHERE id = ?1")
            .bind(id.to_string())
            .bind(Utc::now().to_rfc3339())
            .execute(self.pool.inner())
            .await?;
        Ok(())
    }

    async fn upsert(&self, tenant: &Tenant) -> anyhow::Result<()> {
        let allowed_models = serde_json::to_string(&tenant.allowed_models)?;
        sqlx::query(
            "INSERT INTO tenants (id, name, status, url, database_name, login, secret, \
             requests_per_day, requests_per_hour, max_users, allowed_models, created_at, last_active) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT(id) DO UPDATE SET \
             name = excluded.name, status = excluded.status, url = excluded.url, \
             database_name = excluded.database_name, login = excluded.login, \
             secret = excluded.secret, requests_per_day = excluded.requests_per_day, \
             requests_per_hour = excluded.requests_per_hour, max_users = excluded.max_users, \
             allowed_models = excluded.allowed_models, last_active = excluded.last_active",
        )
        .bind(tenant.id.to_string())
        .bind(&tenant.name)
        .bind(status_to_string(tenant.status))
        .bind(&tenant.credentials.url)
        .bind(&tenant.credentials.database)
        .bind(&tenant.credentials.login)
        .bind(&tenant.credentials.secret)
        .bind(tenant.limits.requests_per_day as i64)
        .bind(tenant.limits.requests_per_hour as i64)
        .bind(tenant.limits.max_users as i64)
        .bind(allowed_models)
        .bind(tenant.created_at.to_rfc3339())
        .bind(tenant.last_active.map(|t| t.to_rfc3339()))
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }
}
