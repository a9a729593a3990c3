//! SQLite implementation of the cache-store port
//!
//! Entries live in two tables: `cache_entries` for opaque byte values and
//! `counters` for integer counters. Expiry is stored as an RFC 3339 UTC
//! string and enforced lazily on read; `purge_expired` exists for a
//! periodic sweep. Pattern deletion uses SQLite's `GLOB` operator and runs
//! in bounded chunks so a large eviction never holds a long write
//! transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::Row;
use tracing::debug;

use recbridge_core::ports::cache_store::ICacheStore;

use crate::pool::DatabasePool;

/// Keys deleted per chunk during a pattern delete
const DELETE_CHUNK: usize = 500;

/// SQLite-backed cache store
pub struct SqliteCacheStore {
    pool: Arc<DatabasePool>,
}

impl SqliteCacheStore {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    fn expires_at(ttl: Option<Duration>) -> Option<String> {
        ttl.map(|ttl| {
            (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()))
                .to_rfc3339()
        })
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    /// Remove every expired row; returns the number of rows removed
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let now = Self::now();
        let entries = sqlx::query("DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1")
            .bind(&now)
            .execute(self.pool.inner())
            .await?
            .rows_affected();
        let counters = sqlx::query("DELETE FROM counters WHERE expires_at IS NOT NULL AND expires_at <= ?1")
            .bind(&now)
            .execute(self.pool.inner())
            .await?
            .rows_affected();
        Ok(entries + counters)
    }

    /// Delete matching keys from one table in bounded chunks
    async fn delete_pattern_from(&self, table: &str, pattern: &str) -> anyhow::Result<u64> {
        let select = format!("SELECT key FROM {table} WHERE key GLOB ?1 LIMIT {DELETE_CHUNK}");
        let mut total = 0u64;

        loop {
            let keys: Vec<String> = sqlx::query(&select)
                .bind(pattern)
                .fetch_all(self.pool.inner())
                .await?
                .into_iter()
                .map(|row| row.get::<String, _>(0))
                .collect();

            if keys.is_empty() {
                break;
            }

            let placeholders = (0..keys.len())
                .map(|i| format!("?{}", i + 1))
                .collect::<Vec<_>>()
                .join(",");
            let delete = format!("DELETE FROM {table} WHERE key IN ({placeholders})");
            let mut query = sqlx::query(&delete);
            for key in &keys {
                query = query.bind(key);
            }
            total += query.execute(self.pool.inner()).await?.rows_affected();

            if keys.len() < DELETE_CHUNK {
                break;
            }
        }

        Ok(total)
    }
}

#[async_trait::async_trait]
impl ICacheStore for SqliteCacheStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let row = sqlx::query(
            "SELECT value FROM cache_entries \
             WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        )
        .bind(key)
        .bind(Self::now())
        .fetch_optional(self.pool.inner())
        .await?;

        Ok(row.map(|r| r.get::<Vec<u8>, _>(0)))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(Self::expires_at(ttl))
        .execute(self.pool.inner())
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let affected = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(self.pool.inner())
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> anyhow::Result<u64> {
        let entries = self.delete_pattern_from("cache_entries", pattern).await?;
        let counters = self.delete_pattern_from("counters", pattern).await?;
        let total = entries + counters;
        if total > 0 {
            debug!(pattern, deleted = total, "Cache pattern delete");
        }
        Ok(total)
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn increment(&self, key: &str, amount: i64) -> anyhow::Result<i64> {
        // Expired counters restart from zero.
        sqlx::query("DELETE FROM counters WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2")
            .bind(key)
            .bind(Self::now())
            .execute(self.pool.inner())
            .await?;

        let row = sqlx::query(
            "INSERT INTO counters (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = counters.value + excluded.value \
             RETURNING value",
        )
        .bind(key)
        .bind(amount)
        .fetch_one(self.pool.inner())
        .await?;

        Ok(row.get::<i64, _>(0))
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> anyhow::Result<bool> {
        let expires_at = Self::expires_at(Some(ttl));
        let entries = sqlx::query("UPDATE cache_entries SET expires_at = ?2 WHERE key = ?1")
            .bind(key)
            .bind(&expires_at)
            .execute(self.pool.inner())
            .await?
            .rows_affected();
        let counters = sqlx::query("UPDATE counters SET expires_at = ?2 WHERE key = ?1")
            .bind(key)
            .bind(&expires_at)
            .execute(self.pool.inner())
            .await?
            .rows_affected();
        Ok(entries + counters > 0)
    }
}
