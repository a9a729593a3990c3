//! Database connection pool management
//!
//! Wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Automatic schema migration on first connection
//! - In-memory mode for testing

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreError;

/// Schema applied on every connect; statements are idempotent
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        key        TEXT PRIMARY KEY,
        value      BLOB NOT NULL,
        expires_at TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at)",
    r#"
    CREATE TABLE IF NOT EXISTS counters (
        key        TEXT PRIMARY KEY,
        value      INTEGER NOT NULL DEFAULT 0,
        expires_at TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id                TEXT PRIMARY KEY,
        name              TEXT NOT NULL,
        status            TEXT NOT NULL,
        url               TEXT NOT NULL,
        database_name     TEXT NOT NULL,
        login             TEXT NOT NULL,
        secret            TEXT NOT NULL,
        requests_per_day  INTEGER NOT NULL,
        requests_per_hour INTEGER NOT NULL,
        max_users         INTEGER NOT NULL,
        allowed_models    TEXT NOT NULL,
        created_at        TEXT NOT NULL,
        last_active       TEXT
    )
    "#,
];

/// Manages a pool of SQLite connections for recbridge persistence
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Creates a new database pool connected to the specified file
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the connection cannot be
    /// established, or `StoreError::MigrationFailed` if schema setup fails.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(path = %db_path.display(), "Database pool initialized");
        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection so the data survives between statements.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .journal_mode(SqliteJournalMode::Memory);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// The underlying SQLx pool
    pub fn inner(&self) -> &SqlitePool {
        &self.pool
    }
}
