//! Sync orchestration: fetch, normalize, migrate, upsert, report.
//!
//! One end-to-end synchronization per source, under the single-flight
//! guard. Faults are isolated per record; everything after job acceptance
//! lands in the job's results and history entry rather than being thrown.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use unidir_connector::{normalize_record, BoxedConnector, RawRecord};
use unidir_core::{IdentityRecord, JobStatus, Source, SyncJob, SyncMode, SyncResults, SyncSummary};
use unidir_store::coerce_value;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::history::RunType;

/// How a bulk load treats existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Truncate the store, then load.
    Replace,
    /// Upsert into the existing records.
    Merge,
}

impl Engine {
    /// Run one synchronization for a source.
    ///
    /// Fails fast with `SyncInProgress` when the source's slot is taken
    /// (no I/O is attempted) and with `NotConfigured` when the connector
    /// is missing or incomplete (the slot is released again). Transport
    /// and per-record failures after acceptance produce a `Failed` job
    /// rather than an error.
    pub async fn sync_source(
        &self,
        source: Source,
        mode: SyncMode,
        triggered_by: &str,
    ) -> EngineResult<SyncJob> {
        self.run_sync(source, mode, triggered_by, RunType::Manual, None)
            .await
    }

    /// Sync with explicit run bookkeeping; used by the scheduler.
    #[instrument(skip(self), fields(source = %source, mode = %mode))]
    pub(crate) async fn run_sync(
        &self,
        source: Source,
        mode: SyncMode,
        triggered_by: &str,
        run_type: RunType,
        schedule_id: Option<Uuid>,
    ) -> EngineResult<SyncJob> {
        if !source.is_syncable() {
            return Err(EngineError::NoSyncSupported { source_kind: source });
        }

        // Atomic check-and-set before any I/O.
        let mut job = self.jobs().try_begin(source, mode, triggered_by).await?;

        let connector = match self.connectors_ref().get(source).await {
            Some(connector) if connector.is_configured() => connector,
            _ => {
                // Early exit must not leave a slot that blocks future
                // attempts.
                self.jobs().release(source, job.id).await;
                return Err(EngineError::NotConfigured { source_kind: source });
            }
        };

        let entry_id = match self.history().begin(source, schedule_id, run_type).await {
            Ok(id) => id,
            Err(e) => {
                self.jobs().release(source, job.id).await;
                return Err(e.into());
            }
        };

        let outcome = self.pull_pipeline(&connector, source, job.id).await;
        let (status, results) = unwrap_outcome(outcome);

        job.finish(status, results);
        if let Err(e) = self.history().finalize(entry_id, &job).await {
            warn!(error = %e, "Failed to finalize history entry");
        }
        self.jobs().release(source, job.id).await;

        info!(
            source = %source,
            status = %job.status,
            added = job.results.added,
            updated = job.results.updated,
            errors = job.results.errors,
            "Sync finished"
        );
        Ok(job)
    }

    /// Fan out over every configured, syncable source and wait for all to
    /// settle. A failure in one source's job does not cancel the others.
    pub async fn sync_all_sources(&self, triggered_by: &str) -> EngineResult<SyncSummary> {
        let sources: Vec<Source> = self
            .connectors_ref()
            .configured_sources()
            .await
            .into_iter()
            .filter(Source::is_syncable)
            .collect();

        let runs = sources
            .iter()
            .map(|&source| self.sync_source(source, SyncMode::Full, triggered_by));
        let outcomes = futures::future::join_all(runs).await;

        let mut summary = SyncSummary::default();
        for (source, outcome) in sources.into_iter().zip(outcomes) {
            match outcome {
                Ok(job) => summary.add(job),
                Err(e) => {
                    let mut job = SyncJob::start(source, SyncMode::Full, triggered_by);
                    let mut results = SyncResults::default();
                    results.error_messages.push(e.to_string());
                    job.finish(JobStatus::Failed, results);
                    summary.add(job);
                }
            }
        }
        Ok(summary)
    }

    /// Mark the running job for a source failed and free its slot.
    ///
    /// Does not interrupt in-flight connector I/O: the fetch runs to
    /// completion or its own timeout, but the task abandons everything
    /// after noticing its slot is gone, and a new attempt may start
    /// immediately.
    pub async fn cancel_sync(&self, source: Source) -> EngineResult<SyncJob> {
        let mut job = self
            .jobs()
            .take(source)
            .await
            .ok_or(EngineError::NotRunning { source_kind: source })?;

        let mut results = SyncResults::default();
        results.error_messages.push("cancelled by operator".to_string());
        job.finish(JobStatus::Failed, results);
        info!(source = %source, job_id = %job.id, "Sync cancelled");
        Ok(job)
    }

    /// Bulk-load records into a push source (upload or manual).
    ///
    /// Replace mode truncates first; both modes then migrate and upsert
    /// with the same per-record fault isolation as a pull sync.
    #[instrument(skip(self, records), fields(source = %source, count = records.len()))]
    pub async fn load_records(
        &self,
        source: Source,
        records: Vec<RawRecord>,
        mode: LoadMode,
        loaded_by: &str,
    ) -> EngineResult<SyncJob> {
        if source.is_syncable() {
            return Err(EngineError::LoadNotSupported { source_kind: source });
        }

        let mut job = self.jobs().try_begin(source, SyncMode::Full, loaded_by).await?;
        let entry_id = match self.history().begin(source, None, RunType::Manual).await {
            Ok(id) => id,
            Err(e) => {
                self.jobs().release(source, job.id).await;
                return Err(e.into());
            }
        };

        let outcome = self.load_pipeline(source, &records, mode, job.id).await;
        let (status, results) = unwrap_outcome(outcome);

        job.finish(status, results);
        if let Err(e) = self.history().finalize(entry_id, &job).await {
            warn!(error = %e, "Failed to finalize history entry");
        }
        self.jobs().release(source, job.id).await;
        Ok(job)
    }

    /// fetch → normalize → migrate → upsert → conflicts, for pull sources.
    async fn pull_pipeline(
        &self,
        connector: &BoxedConnector,
        source: Source,
        job_id: Uuid,
    ) -> Result<(JobStatus, SyncResults), String> {
        let raw = connector
            .fetch()
            .await
            .map_err(|e| format!("fetch failed: {e}"))?;

        let mut results = SyncResults::default();
        results.total_processed = raw.len();

        let prepared = normalize_batch(source, &raw, &mut results);
        self.migrate_and_upsert(source, &raw, prepared, job_id, &mut results)
            .await?;
        self.finish_with_conflicts(results).await
    }

    /// truncate? → normalize → migrate → upsert → conflicts, for loads.
    async fn load_pipeline(
        &self,
        source: Source,
        raw: &[RawRecord],
        mode: LoadMode,
        job_id: Uuid,
    ) -> Result<(JobStatus, SyncResults), String> {
        if mode == LoadMode::Replace {
            self.store()
                .truncate(source)
                .await
                .map_err(|e| format!("truncate failed: {e}"))?;
        }

        let mut results = SyncResults::default();
        results.total_processed = raw.len();

        let prepared = normalize_batch(source, raw, &mut results);
        self.migrate_and_upsert(source, raw, prepared, job_id, &mut results)
            .await?;
        self.finish_with_conflicts(results).await
    }

    /// Shared tail of both pipelines: schema migration over the raw batch,
    /// registry-gated upserts with per-record fault isolation, and the
    /// cancellation check in between.
    async fn migrate_and_upsert(
        &self,
        source: Source,
        raw: &[RawRecord],
        prepared: Vec<(RawRecord, IdentityRecord)>,
        job_id: Uuid,
        results: &mut SyncResults,
    ) -> Result<(), String> {
        // Discovery runs over the source-native field names, so a
        // directory batch registers columns like `mail` or `givenName`
        // even though normalization also maps them onto the typed core.
        let report = self
            .schema()
            .auto_migrate(source, raw)
            .await
            .map_err(|e| format!("schema migration failed: {e}"))?;
        for failed in &report.failed {
            results
                .error_messages
                .push(format!("field '{}' not migrated: {}", failed.field_name, failed.error));
        }
        results.new_fields = report.applied;

        // A cancellation releases the slot; abandon further processing.
        if !self.jobs().is_current(source, job_id).await {
            return Err("sync cancelled".to_string());
        }

        let fields = self
            .store()
            .field_registry(source)
            .await
            .map_err(|e| format!("field registry unavailable: {e}"))?;

        let synced_at = Utc::now();
        for (raw_record, mut record) in prepared {
            record.last_synced_at = Some(synced_at);

            for (name, value) in raw_record.iter() {
                let Some(field) = fields.iter().find(|f| &f.field_name == name) else {
                    continue;
                };
                if let Some(coerced) = coerce_value(value, field.data_type) {
                    record.attributes.insert(name.clone(), coerced);
                }
            }

            // Count added vs updated by whether the source-native key
            // already matched a row.
            let existing = match record.external_id.as_deref() {
                Some(external_id) => {
                    match self.store().find_by_external_id(source, external_id).await {
                        Ok(existing) => existing,
                        Err(e) => {
                            results.errors += 1;
                            results
                                .error_messages
                                .push(format!("{}: lookup failed: {e}", record.email));
                            continue;
                        }
                    }
                }
                None => None,
            };

            let is_update = existing.is_some();
            record.id = existing.map(|e| e.id).unwrap_or_default();

            match self.store().upsert(source, &record).await {
                Ok(_) => {
                    if is_update {
                        results.updated += 1;
                    } else {
                        results.added += 1;
                    }
                }
                Err(e) => {
                    results.errors += 1;
                    results
                        .error_messages
                        .push(format!("{}: {e}", record.email));
                }
            }
        }
        Ok(())
    }

    /// Cross-source conflict scan deciding the terminal status.
    async fn finish_with_conflicts(
        &self,
        mut results: SyncResults,
    ) -> Result<(JobStatus, SyncResults), String> {
        let conflicts = self
            .detector()
            .detect_email_conflicts()
            .await
            .map_err(|e| format!("conflict detection failed: {e}"))?;
        results.conflicts = conflicts;

        let status = if results.conflicts.is_empty() {
            JobStatus::Completed
        } else {
            JobStatus::Conflicts
        };
        Ok((status, results))
    }
}

fn normalize_batch(
    source: Source,
    raw: &[RawRecord],
    results: &mut SyncResults,
) -> Vec<(RawRecord, IdentityRecord)> {
    let mut prepared = Vec::with_capacity(raw.len());
    for raw_record in raw {
        match normalize_record(source, raw_record) {
            Ok(record) => prepared.push((raw_record.clone(), record)),
            Err(e) => {
                results.errors += 1;
                results.error_messages.push(e.to_string());
            }
        }
    }
    prepared
}

fn unwrap_outcome(
    outcome: Result<(JobStatus, SyncResults), String>,
) -> (JobStatus, SyncResults) {
    match outcome {
        Ok((status, results)) => (status, results),
        Err(message) => {
            let mut results = SyncResults::default();
            results.error_messages.push(message);
            (JobStatus::Failed, results)
        }
    }
}
