//! Append-only run history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::fmt;
use tracing::instrument;
use uuid::Uuid;

use unidir_core::{JobStatus, Source, SyncJob};
use unidir_store::{StoreError, StoreResult};

/// How a run was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// Fired by a schedule's trigger.
    Scheduled,
    /// Requested through the trigger surface.
    Manual,
    /// A bounded retry after a failed scheduled run.
    Retry,
}

impl RunType {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Scheduled => "scheduled",
            RunType::Manual => "manual",
            RunType::Retry => "retry",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(RunType::Scheduled),
            "manual" => Ok(RunType::Manual),
            "retry" => Ok(RunType::Retry),
            _ => Err(format!("Unknown run type: {s}")),
        }
    }
}

/// One run of one source, scheduled, manual, or retry.
///
/// Created `running` when the run starts and finalized exactly once with
/// the terminal outcome; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Entry id.
    pub id: Uuid,
    /// Source that ran.
    pub source: Source,
    /// Owning schedule, for scheduled and retry runs.
    pub schedule_id: Option<Uuid>,
    /// How the run was initiated.
    pub run_type: RunType,
    /// Outcome (or `Running` while in flight).
    pub status: JobStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub completed_at: Option<DateTime<Utc>>,
    /// Records processed.
    pub processed: i64,
    /// Records added.
    pub added: i64,
    /// Records updated.
    pub updated: i64,
    /// Per-record errors.
    pub errors: i64,
    /// Error text, if the run failed.
    pub error_message: Option<String>,
}

/// Per-schedule run statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleRunStats {
    /// Runs recorded for the schedule.
    pub total_runs: i64,
    /// Runs that completed cleanly.
    pub succeeded: i64,
    /// Runs that failed.
    pub failed: i64,
    /// Retry-tagged runs.
    pub retries: i64,
}

/// Repository over the shared `sync_history` table.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Create a new history repository.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the history table. Idempotent.
    pub async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_history (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                schedule_id TEXT,
                run_type TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                processed INTEGER NOT NULL DEFAULT 0,
                added INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                errors INTEGER NOT NULL DEFAULT 0,
                error_message TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_history_started \
             ON sync_history (started_at)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the start of a run.
    #[instrument(skip(self))]
    pub async fn begin(
        &self,
        source: Source,
        schedule_id: Option<Uuid>,
        run_type: RunType,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO sync_history (id, source, schedule_id, run_type, status, started_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(source.as_str())
        .bind(schedule_id.map(|s| s.to_string()))
        .bind(run_type.as_str())
        .bind(JobStatus::Running.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Finalize a run with its job outcome. The entry's terminal update.
    #[instrument(skip(self, job))]
    pub async fn finalize(&self, id: Uuid, job: &SyncJob) -> StoreResult<()> {
        let error_message = if job.results.error_messages.is_empty() {
            None
        } else {
            Some(job.results.error_messages.join("; "))
        };

        sqlx::query(
            "UPDATE sync_history SET status = ?, completed_at = ?, processed = ?, \
             added = ?, updated = ?, errors = ?, error_message = ? WHERE id = ?",
        )
        .bind(job.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(job.results.total_processed as i64)
        .bind(job.results.added as i64)
        .bind(job.results.updated as i64)
        .bind(job.results.errors as i64)
        .bind(error_message)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a run that never started (e.g. the guard or configuration
    /// rejected it) as a finished failure.
    pub async fn record_rejected(
        &self,
        source: Source,
        schedule_id: Option<Uuid>,
        run_type: RunType,
        error: &str,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sync_history \
             (id, source, schedule_id, run_type, status, started_at, completed_at, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(source.as_str())
        .bind(schedule_id.map(|s| s.to_string()))
        .bind(run_type.as_str())
        .bind(JobStatus::Failed.as_str())
        .bind(&now)
        .bind(&now)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Most recent entries, newest first.
    pub async fn list(&self, limit: i64) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_history ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Most recent entries for one source, newest first.
    pub async fn list_for_source(
        &self,
        source: Source,
        limit: i64,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM sync_history WHERE source = ? \
             ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(source.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_entry).collect()
    }

    /// Run statistics for one schedule.
    pub async fn stats_for_schedule(&self, schedule_id: Uuid) -> StoreResult<ScheduleRunStats> {
        let rows = sqlx::query(
            "SELECT status, run_type FROM sync_history WHERE schedule_id = ?",
        )
        .bind(schedule_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut stats = ScheduleRunStats::default();
        for row in rows {
            stats.total_runs += 1;
            let status: String = row.try_get("status")?;
            match status.as_str() {
                "completed" => stats.succeeded += 1,
                "failed" | "conflicts" => stats.failed += 1,
                _ => {}
            }
            let run_type: String = row.try_get("run_type")?;
            if run_type == "retry" {
                stats.retries += 1;
            }
        }
        Ok(stats)
    }
}

fn row_to_entry(row: &SqliteRow) -> StoreResult<HistoryEntry> {
    let id: String = row.try_get("id")?;
    let source: String = row.try_get("source")?;
    let schedule_id: Option<String> = row.try_get("schedule_id")?;
    let run_type: String = row.try_get("run_type")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(HistoryEntry {
        id: parse_uuid(&id)?,
        source: source.parse().map_err(StoreError::CorruptValue)?,
        schedule_id: schedule_id.as_deref().map(parse_uuid).transpose()?,
        run_type: run_type.parse().map_err(StoreError::CorruptValue)?,
        status: status.parse().map_err(StoreError::CorruptValue)?,
        started_at: parse_ts(&started_at)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
        processed: row.try_get("processed")?,
        added: row.try_get("added")?,
        updated: row.try_get("updated")?,
        errors: row.try_get("errors")?,
        error_message: row.try_get("error_message")?,
    })
}

fn parse_uuid(text: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(text).map_err(|e| StoreError::CorruptValue(format!("bad uuid '{text}': {e}")))
}

fn parse_ts(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptValue(format!("bad timestamp '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use unidir_core::{SyncMode, SyncResults};
    use unidir_store::connect_in_memory;

    async fn setup() -> HistoryStore {
        let pool = connect_in_memory().await.unwrap();
        let history = HistoryStore::new(pool);
        history.initialize().await.unwrap();
        history
    }

    #[tokio::test]
    async fn test_begin_and_finalize() {
        let history = setup().await;

        let id = history
            .begin(Source::Directory, None, RunType::Manual)
            .await
            .unwrap();

        let mut job = SyncJob::start(Source::Directory, SyncMode::Full, "test");
        let results = SyncResults {
            total_processed: 3,
            added: 2,
            updated: 1,
            ..SyncResults::default()
        };
        job.finish(JobStatus::Completed, results);
        history.finalize(id, &job).await.unwrap();

        let entries = history.list(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.status, JobStatus::Completed);
        assert_eq!(entry.run_type, RunType::Manual);
        assert_eq!(entry.processed, 3);
        assert_eq!(entry.added, 2);
        assert!(entry.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_stats_for_schedule() {
        let history = setup().await;
        let schedule_id = Uuid::new_v4();

        let id = history
            .begin(Source::Ldap, Some(schedule_id), RunType::Scheduled)
            .await
            .unwrap();
        let mut job = SyncJob::start(Source::Ldap, SyncMode::Full, "scheduler");
        job.finish(JobStatus::Failed, SyncResults::default());
        history.finalize(id, &job).await.unwrap();

        for _ in 0..2 {
            let id = history
                .begin(Source::Ldap, Some(schedule_id), RunType::Retry)
                .await
                .unwrap();
            let mut job = SyncJob::start(Source::Ldap, SyncMode::Full, "scheduler");
            job.finish(JobStatus::Failed, SyncResults::default());
            history.finalize(id, &job).await.unwrap();
        }

        let stats = history.stats_for_schedule(schedule_id).await.unwrap();
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.retries, 2);
    }

    #[tokio::test]
    async fn test_list_for_source_filters() {
        let history = setup().await;
        history
            .record_rejected(Source::Ldap, None, RunType::Scheduled, "busy")
            .await
            .unwrap();
        history
            .begin(Source::Directory, None, RunType::Manual)
            .await
            .unwrap();

        let ldap = history.list_for_source(Source::Ldap, 10).await.unwrap();
        assert_eq!(ldap.len(), 1);
        assert_eq!(ldap[0].status, JobStatus::Failed);
        assert_eq!(ldap[0].error_message.as_deref(), Some("busy"));
    }
}
