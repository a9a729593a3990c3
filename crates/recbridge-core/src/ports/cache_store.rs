//! Cache store port (driven/secondary port)
//!
//! A key -> bytes store with TTL, glob pattern deletion, and counter
//! semantics. Values are opaque at this layer; encoding is the caller's
//! concern. Backends must be safe for concurrent use; `delete_pattern` may
//! run concurrently with reads and writes with no ordering guarantee.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at this boundary are
//!   backend-specific; the gateway treats cache failures as misses.
//! - `delete_pattern` must be O(matches) amortized and must not block other
//!   operations unbounded (backends scan in chunks).

use std::time::Duration;

/// Port trait for the key/value cache
#[async_trait::async_trait]
pub trait ICacheStore: Send + Sync {
    /// Fetch a value, `None` on miss or expiry
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Store a value, optionally expiring after `ttl`
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> anyhow::Result<()>;

    /// Delete a single key; returns whether it existed
    async fn delete(&self, key: &str) -> anyhow::Result<bool>;

    /// Delete every key matching a glob pattern (`*` wildcard)
    ///
    /// Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> anyhow::Result<u64>;

    /// Whether a live (unexpired) entry exists for `key`
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Atomically add `amount` to an integer counter, creating it at zero
    ///
    /// Returns the new counter value.
    async fn increment(&self, key: &str, amount: i64) -> anyhow::Result<i64>;

    /// Set or replace the expiry of an existing key
    ///
    /// Returns `false` when the key does not exist.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> anyhow::Result<bool>;
}
