//! Recbridge Store - Local state persistence
//!
//! SQLite-based storage for:
//! - The TTL key/value cache behind the gateway (`ICacheStore`)
//! - Rate-limit counters
//! - The tenant directory (`ITenantDirectory`)
//!
//! An in-memory cache backend ([`memory::MemoryCacheStore`]) is provided for
//! tests and single-process deployments that do not want a database file.

pub mod cache;
pub mod memory;
pub mod pool;
pub mod tenants;

use thiserror::Error;

pub use cache::SqliteCacheStore;
pub use memory::MemoryCacheStore;
pub use pool::DatabasePool;
pub use tenants::SqliteTenantDirectory;

/// Errors produced by the store adapters
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open or create the database
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A query failed
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// A stored value could not be decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),
}
