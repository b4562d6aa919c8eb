//! Schedule management and automatic sync runs.
//!
//! Each schedule owns at most one registered trigger at a time; enabling,
//! disabling, or editing a schedule always stops the old trigger before
//! registering a new one. Fired runs go through the engine's orchestrator
//! and land in run history; failed or conflicted runs are retried on a
//! bounded budget through the retry queue.

pub mod cron;
pub mod retry;
pub mod trigger;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use unidir_core::{JobStatus, Source, SyncMode};
use unidir_store::{StoreError, StoreResult};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::history::{RunType, ScheduleRunStats};

use self::retry::{RetryQueue, RetryState};
use self::trigger::{TriggerBackend, TriggerCallback, TriggerHandle};

/// Lifecycle state of a schedule's trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    /// Trigger registered and running.
    Active,
    /// No trigger registered.
    Inactive,
    /// Trigger registration failed.
    Error,
}

impl ScheduleStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Active => "active",
            ScheduleStatus::Inactive => "inactive",
            ScheduleStatus::Error => "error",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScheduleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ScheduleStatus::Active),
            "inactive" => Ok(ScheduleStatus::Inactive),
            "error" => Ok(ScheduleStatus::Error),
            _ => Err(format!("Unknown schedule status: {s}")),
        }
    }
}

/// A recurring trigger configuration for one syncable source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule id.
    pub id: Uuid,
    /// Source to synchronize.
    pub source: Source,
    /// Whether the schedule should have a registered trigger.
    pub enabled: bool,
    /// Cron expression, `minute hour * * *` evaluated natively.
    pub cron_expression: String,
    /// Timezone label passed to the trigger backend.
    pub timezone: String,
    /// Retry failed or conflicted runs.
    pub retry_on_error: bool,
    /// Total retries budgeted per failure chain.
    pub retry_attempts: u32,
    /// Delay before each retry.
    pub retry_delay_minutes: u32,
    /// When the schedule last fired.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Next computed occurrence, for display.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Trigger lifecycle state.
    pub status: ScheduleStatus,
    /// When the schedule was created.
    pub created_at: DateTime<Utc>,
    /// When the schedule was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating or updating a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    /// Source to synchronize.
    pub source: Source,
    /// Whether to register a trigger immediately.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Cron expression.
    pub cron_expression: String,
    /// Timezone label.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Retry failed runs.
    #[serde(default)]
    pub retry_on_error: bool,
    /// Retry budget.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Delay between retries.
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
}

fn default_enabled() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_minutes() -> u32 {
    5
}

impl ScheduleRequest {
    fn validate(&self) -> EngineResult<()> {
        if !self.source.is_syncable() {
            return Err(EngineError::invalid_schedule(format!(
                "source {} does not support scheduled sync",
                self.source
            )));
        }
        cron::parse(&self.cron_expression).map_err(EngineError::invalid_schedule)?;
        Ok(())
    }
}

/// Repository over the shared `sync_schedules` table.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    pool: SqlitePool,
}

impl ScheduleStore {
    /// Create a new schedule repository.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schedules table. Idempotent.
    pub async fn initialize(&self) -> StoreResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sync_schedules (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                cron_expression TEXT NOT NULL,
                timezone TEXT NOT NULL DEFAULT 'UTC',
                retry_on_error INTEGER NOT NULL DEFAULT 0,
                retry_attempts INTEGER NOT NULL DEFAULT 3,
                retry_delay_minutes INTEGER NOT NULL DEFAULT 5,
                last_run_at TEXT,
                next_run_at TEXT,
                status TEXT NOT NULL DEFAULT 'inactive',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert(&self, schedule: &Schedule) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sync_schedules \
             (id, source, enabled, cron_expression, timezone, retry_on_error, \
              retry_attempts, retry_delay_minutes, last_run_at, next_run_at, \
              status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(schedule.id.to_string())
        .bind(schedule.source.as_str())
        .bind(schedule.enabled)
        .bind(&schedule.cron_expression)
        .bind(&schedule.timezone)
        .bind(schedule.retry_on_error)
        .bind(i64::from(schedule.retry_attempts))
        .bind(i64::from(schedule.retry_delay_minutes))
        .bind(schedule.last_run_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.next_run_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.status.as_str())
        .bind(schedule.created_at.to_rfc3339())
        .bind(schedule.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, schedule: &Schedule) -> StoreResult<()> {
        sqlx::query(
            "UPDATE sync_schedules SET source = ?, enabled = ?, cron_expression = ?, \
             timezone = ?, retry_on_error = ?, retry_attempts = ?, \
             retry_delay_minutes = ?, last_run_at = ?, next_run_at = ?, status = ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(schedule.source.as_str())
        .bind(schedule.enabled)
        .bind(&schedule.cron_expression)
        .bind(&schedule.timezone)
        .bind(schedule.retry_on_error)
        .bind(i64::from(schedule.retry_attempts))
        .bind(i64::from(schedule.retry_delay_minutes))
        .bind(schedule.last_run_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.next_run_at.map(|dt| dt.to_rfc3339()))
        .bind(schedule.status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(schedule.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM sync_schedules WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        let row = sqlx::query("SELECT * FROM sync_schedules WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_schedule).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<Schedule>> {
        let rows = sqlx::query("SELECT * FROM sync_schedules ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_schedule).collect()
    }

    async fn set_run_times(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE sync_schedules SET last_run_at = ?, next_run_at = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(last_run_at.to_rfc3339())
        .bind(next_run_at.map(|dt| dt.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn row_to_schedule(row: &SqliteRow) -> StoreResult<Schedule> {
    let id: String = row.try_get("id")?;
    let source: String = row.try_get("source")?;
    let status: String = row.try_get("status")?;
    let last_run_at: Option<String> = row.try_get("last_run_at")?;
    let next_run_at: Option<String> = row.try_get("next_run_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let retry_attempts: i64 = row.try_get("retry_attempts")?;
    let retry_delay_minutes: i64 = row.try_get("retry_delay_minutes")?;

    Ok(Schedule {
        id: Uuid::parse_str(&id)
            .map_err(|e| StoreError::CorruptValue(format!("bad uuid '{id}': {e}")))?,
        source: source.parse().map_err(StoreError::CorruptValue)?,
        enabled: row.try_get("enabled")?,
        cron_expression: row.try_get("cron_expression")?,
        timezone: row.try_get("timezone")?,
        retry_on_error: row.try_get("retry_on_error")?,
        retry_attempts: retry_attempts.max(0) as u32,
        retry_delay_minutes: retry_delay_minutes.max(0) as u32,
        last_run_at: last_run_at.as_deref().map(parse_ts).transpose()?,
        next_run_at: next_run_at.as_deref().map(parse_ts).transpose()?,
        status: status.parse().map_err(StoreError::CorruptValue)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn parse_ts(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptValue(format!("bad timestamp '{text}': {e}")))
}

/// Run execution shared between trigger callbacks and the retry loop.
struct SchedulerCore {
    engine: Arc<Engine>,
    schedules: ScheduleStore,
    retries: RetryQueue,
    shutdown: AtomicBool,
}

impl SchedulerCore {
    /// Execute one run for a schedule and do the follow-up bookkeeping:
    /// refresh run times, and enqueue a retry when the run failed or
    /// conflicted and budget remains. `attempt` is 0 for the original
    /// scheduled firing.
    #[instrument(skip(self), fields(schedule_id = %schedule_id, attempt))]
    async fn execute_run(&self, schedule_id: Uuid, run_type: RunType, attempt: u32) {
        let schedule = match self.schedules.get(schedule_id).await {
            Ok(Some(schedule)) => schedule,
            Ok(None) => {
                warn!("Schedule vanished before its run");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Could not load schedule for run");
                return;
            }
        };

        let outcome = self
            .engine
            .run_sync(
                schedule.source,
                SyncMode::Full,
                "scheduler",
                run_type,
                Some(schedule_id),
            )
            .await;

        let now = Utc::now();
        let next = cron::next_run(&schedule.cron_expression, now);
        if let Err(e) = self.schedules.set_run_times(schedule_id, now, next).await {
            warn!(error = %e, "Could not refresh schedule run times");
        }

        let needs_retry = match &outcome {
            Ok(job) => matches!(job.status, JobStatus::Failed | JobStatus::Conflicts),
            Err(e) => {
                // The run never started (guard or configuration); still a
                // recorded, retriable outcome for this schedule.
                if let Err(history_err) = self
                    .engine
                    .history()
                    .record_rejected(schedule.source, Some(schedule_id), run_type, &e.to_string())
                    .await
                {
                    warn!(error = %history_err, "Could not record rejected run");
                }
                true
            }
        };

        if needs_retry && schedule.retry_on_error && attempt < schedule.retry_attempts {
            let state = RetryState {
                schedule_id,
                source: schedule.source,
                attempt: attempt + 1,
                max_attempts: schedule.retry_attempts,
                next_attempt_at: now + Duration::minutes(i64::from(schedule.retry_delay_minutes)),
            };
            info!(
                schedule_id = %schedule_id,
                attempt = state.attempt,
                max = state.max_attempts,
                "Scheduling retry"
            );
            self.retries.push(state);
        }
    }

    /// Run every due retry; returns how many ran.
    async fn process_due_retries(&self, now: DateTime<Utc>) -> usize {
        let due = self.retries.take_due(now);
        let count = due.len();
        for state in due {
            self.execute_run(state.schedule_id, RunType::Retry, state.attempt)
                .await;
        }
        count
    }
}

/// How often the retry loop polls for due retries.
const RETRY_POLL_INTERVAL_SECS: u64 = 30;

/// Maintains schedules and their triggers.
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    backend: Arc<dyn TriggerBackend>,
    triggers: Mutex<HashMap<Uuid, TriggerHandle>>,
}

impl Scheduler {
    /// Create a scheduler over an engine and a trigger backend.
    #[must_use]
    pub fn new(engine: Arc<Engine>, backend: Arc<dyn TriggerBackend>) -> Self {
        let schedules = ScheduleStore::new(engine.pool().clone());
        Self {
            core: Arc::new(SchedulerCore {
                engine,
                schedules,
                retries: RetryQueue::new(),
                shutdown: AtomicBool::new(false),
            }),
            backend,
            triggers: Mutex::new(HashMap::new()),
        }
    }

    /// Create the schedules table and register triggers for every enabled
    /// schedule. Idempotent on the table; re-registers triggers.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> EngineResult<()> {
        self.core.schedules.initialize().await?;

        for mut schedule in self.core.schedules.list().await? {
            if schedule.enabled {
                self.activate(&mut schedule).await?;
            }
        }
        info!("Scheduler initialized");
        Ok(())
    }

    /// Start the retry loop. Runs until [`Scheduler::request_shutdown`].
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let core = self.core.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(RETRY_POLL_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                if core.shutdown.load(Ordering::Relaxed) {
                    info!("Retry loop stopped");
                    break;
                }
                core.process_due_retries(Utc::now()).await;
            }
        })
    }

    /// Ask the retry loop to stop after its current tick.
    pub fn request_shutdown(&self) {
        self.core.shutdown.store(true, Ordering::Relaxed);
    }

    /// Create a schedule; registers its trigger when enabled.
    #[instrument(skip(self, request), fields(source = %request.source))]
    pub async fn create_schedule(&self, request: ScheduleRequest) -> EngineResult<Schedule> {
        request.validate()?;

        let now = Utc::now();
        let mut schedule = Schedule {
            id: Uuid::new_v4(),
            source: request.source,
            enabled: request.enabled,
            cron_expression: request.cron_expression,
            timezone: request.timezone,
            retry_on_error: request.retry_on_error,
            retry_attempts: request.retry_attempts,
            retry_delay_minutes: request.retry_delay_minutes,
            last_run_at: None,
            next_run_at: None,
            status: ScheduleStatus::Inactive,
            created_at: now,
            updated_at: now,
        };
        self.core.schedules.insert(&schedule).await?;

        if schedule.enabled {
            self.activate(&mut schedule).await?;
        }
        info!(schedule_id = %schedule.id, "Schedule created");
        Ok(schedule)
    }

    /// Update a schedule. Any existing trigger is stopped first; a new one
    /// is registered when the updated schedule is enabled.
    #[instrument(skip(self, request))]
    pub async fn update_schedule(
        &self,
        id: Uuid,
        request: ScheduleRequest,
    ) -> EngineResult<Schedule> {
        request.validate()?;

        let mut schedule = self
            .core
            .schedules
            .get(id)
            .await?
            .ok_or(EngineError::ScheduleNotFound { id })?;

        self.deactivate(&mut schedule).await?;

        schedule.source = request.source;
        schedule.enabled = request.enabled;
        schedule.cron_expression = request.cron_expression;
        schedule.timezone = request.timezone;
        schedule.retry_on_error = request.retry_on_error;
        schedule.retry_attempts = request.retry_attempts;
        schedule.retry_delay_minutes = request.retry_delay_minutes;
        schedule.updated_at = Utc::now();

        if schedule.enabled {
            self.activate(&mut schedule).await?;
        } else {
            self.core.schedules.update(&schedule).await?;
        }
        Ok(schedule)
    }

    /// Delete a schedule, stopping its trigger.
    #[instrument(skip(self))]
    pub async fn delete_schedule(&self, id: Uuid) -> EngineResult<()> {
        if let Some(handle) = self.triggers.lock().await.remove(&id) {
            self.backend.cancel(&handle);
        }
        if !self.core.schedules.delete(id).await? {
            return Err(EngineError::ScheduleNotFound { id });
        }
        info!(schedule_id = %id, "Schedule deleted");
        Ok(())
    }

    /// Fetch one schedule.
    pub async fn get_schedule(&self, id: Uuid) -> EngineResult<Schedule> {
        self.core
            .schedules
            .get(id)
            .await?
            .ok_or(EngineError::ScheduleNotFound { id })
    }

    /// List all schedules.
    pub async fn list_schedules(&self) -> EngineResult<Vec<Schedule>> {
        Ok(self.core.schedules.list().await?)
    }

    /// Run statistics for one schedule.
    pub async fn schedule_stats(&self, id: Uuid) -> EngineResult<ScheduleRunStats> {
        Ok(self.core.engine.history().stats_for_schedule(id).await?)
    }

    /// Fire a schedule immediately, outside its trigger.
    pub async fn run_schedule_now(&self, id: Uuid) -> EngineResult<()> {
        self.get_schedule(id).await?;
        self.core.execute_run(id, RunType::Scheduled, 0).await;
        Ok(())
    }

    /// Run every due retry now; returns how many ran. The retry loop calls
    /// this on a timer; tests call it directly with a synthetic clock.
    pub async fn process_due_retries(&self, now: DateTime<Utc>) -> usize {
        self.core.process_due_retries(now).await
    }

    /// Pending retries not yet due.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.core.retries.len()
    }

    /// Register the trigger for a schedule and persist the resulting
    /// status. Exactly one trigger per schedule: any previous handle is
    /// cancelled first.
    async fn activate(&self, schedule: &mut Schedule) -> EngineResult<()> {
        if let Some(handle) = self.triggers.lock().await.remove(&schedule.id) {
            self.backend.cancel(&handle);
        }

        let core = self.core.clone();
        let schedule_id = schedule.id;
        let callback: TriggerCallback = Arc::new(move || {
            let core = core.clone();
            Box::pin(async move {
                core.execute_run(schedule_id, RunType::Scheduled, 0).await;
            })
        });

        match self
            .backend
            .register(&schedule.cron_expression, &schedule.timezone, callback)
        {
            Ok(handle) => {
                self.triggers.lock().await.insert(schedule.id, handle);
                schedule.status = ScheduleStatus::Active;
                schedule.next_run_at = cron::next_run(&schedule.cron_expression, Utc::now());
            }
            Err(e) => {
                warn!(schedule_id = %schedule.id, error = %e, "Trigger registration failed");
                schedule.status = ScheduleStatus::Error;
                schedule.next_run_at = None;
            }
        }
        self.core.schedules.update(schedule).await?;
        Ok(())
    }

    /// Stop the schedule's trigger and persist the inactive status.
    async fn deactivate(&self, schedule: &mut Schedule) -> EngineResult<()> {
        if let Some(handle) = self.triggers.lock().await.remove(&schedule.id) {
            self.backend.cancel(&handle);
        }
        schedule.status = ScheduleStatus::Inactive;
        schedule.next_run_at = None;
        self.core.schedules.update(schedule).await?;
        Ok(())
    }
}
