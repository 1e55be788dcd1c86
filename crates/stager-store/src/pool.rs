//! Job database connections
//!
//! The worker opens the job database once per invocation. Schema versions
//! are tracked in SQLite's `user_version` pragma and every migration newer
//! than the stored version is applied in order, so an older database is
//! upgraded in place.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use crate::StoreError;

/// Ordered schema migrations; the index plus one is the schema version
const MIGRATIONS: &[(&str, &str)] = &[("jobs", include_str!("migrations/20260301_jobs.sql"))];

/// How long a writer waits for a competing transaction
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connections for a file database; one orchestrator writes, `status` reads
const MAX_FILE_CONNECTIONS: u32 = 4;

/// Connection pool over the job database
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) the job database at `db_path`
    ///
    /// # Errors
    ///
    /// `StoreError::ConnectionFailed` when the directory or the database
    /// cannot be opened, `StoreError::MigrationFailed` when the schema
    /// cannot be brought up to date.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionFailed(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_FILE_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("cannot open {}: {e}", db_path.display()))
            })?;

        let version = migrate(&pool).await?;
        info!(path = %db_path.display(), schema = version, "job database ready");
        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// Limited to one connection: every SQLite in-memory connection is a
    /// separate database.
    ///
    /// # Errors
    ///
    /// Same as [`DatabasePool::new`].
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("in-memory database: {e}")))?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Apply pending migrations; returns the resulting schema version
async fn migrate(pool: &SqlitePool) -> Result<usize, StoreError> {
    let failed = |name: &str, e: sqlx::Error| StoreError::MigrationFailed(format!("{name}: {e}"));

    let current: i64 = sqlx::query("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .and_then(|row| row.try_get(0))
        .map_err(|e| failed("user_version", e))?;
    let current = usize::try_from(current).unwrap_or(0);

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index + 1;
        let mut tx = pool.begin().await.map_err(|e| failed(name, e))?;
        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| failed(name, e))?;
        // PRAGMA does not take bind parameters
        sqlx::raw_sql(&format!("PRAGMA user_version = {version}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| failed(name, e))?;
        tx.commit().await.map_err(|e| failed(name, e))?;
        debug!(migration = name, version, "migration applied");
    }
    Ok(MIGRATIONS.len().max(current))
}
