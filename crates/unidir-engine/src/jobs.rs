//! Single-flight job tracking.
//!
//! The one piece of mutable shared state requiring explicit
//! synchronization: a map of currently running jobs keyed by source,
//! checked and set atomically before any I/O begins. Two near-simultaneous
//! triggers for the same source (manual + scheduled) are a realistic race;
//! exactly one wins the slot.

use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use unidir_core::{Source, SyncJob, SyncMode};

use crate::error::{EngineError, EngineResult};

/// In-memory registry of running jobs, one slot per source.
#[derive(Default)]
pub struct JobTracker {
    running: Mutex<HashMap<Source, SyncJob>>,
}

impl JobTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the source's slot and create a running job.
    ///
    /// Fails with `SyncInProgress` when the slot is taken; no I/O has
    /// happened at that point.
    pub async fn try_begin(
        &self,
        source: Source,
        mode: SyncMode,
        started_by: &str,
    ) -> EngineResult<SyncJob> {
        let mut running = self.running.lock().await;
        if running.contains_key(&source) {
            debug!(source = %source, "Sync slot already taken");
            return Err(EngineError::SyncInProgress { source_kind: source });
        }
        let job = SyncJob::start(source, mode, started_by);
        running.insert(source, job.clone());
        info!(source = %source, job_id = %job.id, "Sync job accepted");
        Ok(job)
    }

    /// Release the slot if it still belongs to the given job.
    ///
    /// Returns `false` when the slot was already released or re-claimed by
    /// a newer job (e.g. after cancellation).
    pub async fn release(&self, source: Source, job_id: Uuid) -> bool {
        let mut running = self.running.lock().await;
        if running.get(&source).is_some_and(|job| job.id == job_id) {
            running.remove(&source);
            true
        } else {
            false
        }
    }

    /// Whether the slot is still held by the given job.
    pub async fn is_current(&self, source: Source, job_id: Uuid) -> bool {
        self.running
            .lock()
            .await
            .get(&source)
            .is_some_and(|job| job.id == job_id)
    }

    /// The running job for a source, if any.
    pub async fn get(&self, source: Source) -> Option<SyncJob> {
        self.running.lock().await.get(&source).cloned()
    }

    /// Remove and return the running job for a source.
    ///
    /// Used by cancellation: the guard becomes available immediately; the
    /// in-flight task notices its slot is gone and abandons further
    /// processing.
    pub async fn take(&self, source: Source) -> Option<SyncJob> {
        self.running.lock().await.remove(&source)
    }

    /// Sources with a running job.
    pub async fn running_sources(&self) -> Vec<Source> {
        let running = self.running.lock().await;
        Source::ALL
            .into_iter()
            .filter(|source| running.contains_key(source))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_begin_is_rejected() {
        let tracker = JobTracker::new();
        let job = tracker
            .try_begin(Source::Ldap, SyncMode::Full, "test")
            .await
            .unwrap();

        let err = tracker
            .try_begin(Source::Ldap, SyncMode::Full, "test")
            .await
            .unwrap_err();
        assert!(err.is_sync_in_progress());

        // A different source is unaffected.
        tracker
            .try_begin(Source::Directory, SyncMode::Full, "test")
            .await
            .unwrap();

        assert!(tracker.release(Source::Ldap, job.id).await);
        tracker
            .try_begin(Source::Ldap, SyncMode::Full, "test")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_requires_matching_job() {
        let tracker = JobTracker::new();
        let job = tracker
            .try_begin(Source::Upload, SyncMode::Full, "test")
            .await
            .unwrap();

        assert!(!tracker.release(Source::Upload, Uuid::new_v4()).await);
        assert!(tracker.is_current(Source::Upload, job.id).await);
        assert!(tracker.release(Source::Upload, job.id).await);
        assert!(!tracker.is_current(Source::Upload, job.id).await);
    }

    #[tokio::test]
    async fn test_take_frees_slot_for_new_job() {
        let tracker = JobTracker::new();
        let job = tracker
            .try_begin(Source::Directory, SyncMode::Full, "test")
            .await
            .unwrap();

        let taken = tracker.take(Source::Directory).await.unwrap();
        assert_eq!(taken.id, job.id);

        // Old job can no longer release; new job can start.
        assert!(!tracker.release(Source::Directory, job.id).await);
        tracker
            .try_begin(Source::Directory, SyncMode::Full, "test")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_begin_exactly_one_wins() {
        let tracker = std::sync::Arc::new(JobTracker::new());

        let a = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .try_begin(Source::Ldap, SyncMode::Full, "a")
                    .await
                    .is_ok()
            })
        };
        let b = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .try_begin(Source::Ldap, SyncMode::Full, "b")
                    .await
                    .is_ok()
            })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one concurrent begin must win");
    }
}
