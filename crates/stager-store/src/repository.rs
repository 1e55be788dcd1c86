//! SQLite implementation of IJobStore
//!
//! Concrete SQLite-based implementation of the job store port defined in
//! stager-core.
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                   |
//! |-----------------|----------|--------------------------------------------|
//! | JobId           | TEXT     | `.as_str()` / `JobId::new()`               |
//! | JobPayload      | TEXT     | serde_json of the redacted payload         |
//! | JobStatus       | TEXT     | `.as_str()` / `FromStr`                    |
//! | Progress        | INTEGER  | one column per counter                     |
//! | DateTime<Utc>   | TEXT     | RFC 3339, microseconds, `Z` suffix         |

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use stager_core::domain::{JobId, JobPayload, JobStatus, Progress};
use stager_core::ports::{IJobStore, JobRecord};

use crate::StoreError;

/// SQLite-based implementation of the job store port
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recently updated jobs first
    pub async fn list_jobs(&self, limit: u32) -> anyhow::Result<Vec<JobRecord>> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY updated_at DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| job_from_row(r).map_err(anyhow::Error::from))
            .collect()
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e)))
}

/// Fixed-width RFC 3339 so that text ordering is time ordering
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn counter(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn counter_from(row: &SqliteRow, column: &str) -> u64 {
    u64::try_from(row.get::<i64, _>(column)).unwrap_or_default()
}

// ============================================================================
// Row mapping
// ============================================================================

fn job_from_row(row: &SqliteRow) -> Result<JobRecord, StoreError> {
    let id_str: String = row.get("id");
    let payload_json: String = row.get("payload");
    let status_str: String = row.get("status");
    let attempt: i64 = row.get("attempt");
    let reason: Option<String> = row.get("reason");
    let created_at_str: String = row.get("created_at");
    let updated_at_str: String = row.get("updated_at");

    let id = JobId::new(id_str.clone())
        .map_err(|e| StoreError::SerializationError(format!("Invalid JobId '{}': {}", id_str, e)))?;
    let payload: JobPayload = serde_json::from_str(&payload_json).map_err(|e| {
        StoreError::SerializationError(format!("Invalid payload for job {}: {}", id_str, e))
    })?;
    let status = JobStatus::from_str(&status_str)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;

    Ok(JobRecord {
        id,
        payload,
        status,
        attempt: u32::try_from(attempt).unwrap_or_default(),
        progress: Progress {
            total: counter_from(row, "total"),
            processed: counter_from(row, "processed"),
            failed: counter_from(row, "failed"),
        },
        reason,
        created_at: parse_datetime(&created_at_str)?,
        updated_at: parse_datetime(&updated_at_str)?,
    })
}

// ============================================================================
// IJobStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IJobStore for SqliteJobStore {
    async fn create_job(&self, id: &JobId, payload: &JobPayload) -> anyhow::Result<()> {
        let payload_json = serde_json::to_string(&payload.redacted())
            .map_err(|e| anyhow::anyhow!("Failed to serialize payload: {}", e))?;
        let now = timestamp();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO jobs \
             (id, payload, status, attempt, total, processed, failed, reason, created_at, updated_at) \
             VALUES (?, ?, ?, 0, 0, 0, 0, NULL, ?, ?)",
        )
        .bind(id.as_str())
        .bind(&payload_json)
        .bind(JobStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::trace!(job_id = %id, inserted = result.rows_affected(), "Created job");
        Ok(())
    }

    async fn begin_attempt(&self, id: &JobId) -> anyhow::Result<u32> {
        let now = timestamp();

        let row = sqlx::query(
            "UPDATE jobs SET attempt = attempt + 1, status = ?, \
             total = 0, processed = 0, failed = 0, reason = NULL, updated_at = ? \
             WHERE id = ? RETURNING attempt",
        )
        .bind(JobStatus::Running.as_str())
        .bind(&now)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::UnknownJob(id.to_string()))?;

        let attempt: i64 = row.get("attempt");
        tracing::trace!(job_id = %id, attempt, "Began attempt");
        Ok(u32::try_from(attempt).unwrap_or(u32::MAX))
    }

    async fn save_progress(&self, id: &JobId, progress: &Progress) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET total = ?, processed = ?, failed = ?, updated_at = ? WHERE id = ?",
        )
        .bind(counter(progress.total))
        .bind(counter(progress.processed))
        .bind(counter(progress.failed))
        .bind(timestamp())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownJob(id.to_string()).into());
        }
        tracing::trace!(job_id = %id, ?progress, "Saved progress");
        Ok(())
    }

    async fn finish(
        &self,
        id: &JobId,
        status: JobStatus,
        progress: &Progress,
        reason: Option<&str>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, total = ?, processed = ?, failed = ?, \
             reason = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(counter(progress.total))
        .bind(counter(progress.processed))
        .bind(counter(progress.failed))
        .bind(reason)
        .bind(timestamp())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownJob(id.to_string()).into());
        }
        tracing::trace!(job_id = %id, status = %status, "Finished job");
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> anyhow::Result<Option<JobRecord>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(job_from_row(r)?)),
            None => Ok(None),
        }
    }
}
