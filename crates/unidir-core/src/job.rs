//! Sync job lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::conflict::EmailConflict;
use crate::field::FieldRegistryEntry;
use crate::source::Source;

/// Status of a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and executing.
    Running,
    /// Finished with no cross-source conflicts.
    Completed,
    /// Aborted by a fetch failure or cancellation.
    Failed,
    /// Finished, but cross-source email conflicts need operator resolution.
    Conflicts,
}

impl JobStatus {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Conflicts => "conflicts",
        }
    }

    /// Check if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "conflicts" => Ok(JobStatus::Conflicts),
            _ => Err(format!("Unknown job status: {s}")),
        }
    }
}

/// Requested synchronization depth.
///
/// Connectors return full snapshots, so both modes currently process the
/// complete batch; the mode is recorded on the job for history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Process everything the connector returns.
    Full,
    /// Reserved for change-based sync.
    Incremental,
}

impl SyncMode {
    /// Convert to string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters and findings produced by one sync run.
///
/// Immutable once the owning job reaches a terminal state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncResults {
    /// Records the connector returned.
    pub total_processed: usize,
    /// Records inserted.
    pub added: usize,
    /// Records updated in place.
    pub updated: usize,
    /// Per-record write failures (isolated, not fatal).
    pub errors: usize,
    /// Messages for the failures counted in `errors`, plus any fatal error.
    pub error_messages: Vec<String>,
    /// Cross-source conflicts found after the run.
    pub conflicts: Vec<EmailConflict>,
    /// Fields registered by this run's schema migration.
    pub new_fields: Vec<FieldRegistryEntry>,
    /// Wall-clock duration of the run.
    pub duration_ms: i64,
}

/// One execution of fetch, normalize, migrate, upsert for a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    /// Job id.
    pub id: Uuid,
    /// Source being synchronized.
    pub source: Source,
    /// Current status.
    pub status: JobStatus,
    /// Requested mode.
    pub mode: SyncMode,
    /// When the job was accepted.
    pub started_at: DateTime<Utc>,
    /// Who triggered the job ("scheduler", "manual", a user id, ...).
    pub started_by: String,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Run counters and findings.
    pub results: SyncResults,
}

impl SyncJob {
    /// Create a job in the `Running` state.
    #[must_use]
    pub fn start(source: Source, mode: SyncMode, started_by: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            status: JobStatus::Running,
            mode,
            started_at: Utc::now(),
            started_by: started_by.into(),
            completed_at: None,
            results: SyncResults::default(),
        }
    }

    /// Transition to a terminal status, stamping completion time and duration.
    pub fn finish(&mut self, status: JobStatus, results: SyncResults) {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        self.status = status;
        self.results = results;
        self.results.duration_ms = (now - self.started_at).num_milliseconds();
        self.completed_at = Some(now);
    }
}

/// Aggregate outcome of `sync_all_sources`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Jobs attempted.
    pub total: usize,
    /// Jobs that completed cleanly.
    pub completed: usize,
    /// Jobs that failed.
    pub failed: usize,
    /// Jobs that finished with conflicts.
    pub conflicts: usize,
    /// The individual jobs, keyed by their source.
    pub jobs: Vec<SyncJob>,
}

impl SyncSummary {
    /// Fold one job into the summary.
    pub fn add(&mut self, job: SyncJob) {
        self.total += 1;
        match job.status {
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Conflicts => self.conflicts += 1,
            JobStatus::Running => {}
        }
        self.jobs.push(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Conflicts,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Conflicts.is_terminal());
    }

    #[test]
    fn test_job_finish_stamps_completion() {
        let mut job = SyncJob::start(Source::Directory, SyncMode::Full, "test");
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.completed_at.is_none());

        job.finish(JobStatus::Completed, SyncResults::default());
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.results.duration_ms >= 0);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = SyncSummary::default();

        let mut ok = SyncJob::start(Source::Directory, SyncMode::Full, "test");
        ok.finish(JobStatus::Completed, SyncResults::default());
        summary.add(ok);

        let mut bad = SyncJob::start(Source::Ldap, SyncMode::Full, "test");
        bad.finish(JobStatus::Failed, SyncResults::default());
        summary.add(bad);

        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.conflicts, 0);
    }
}
