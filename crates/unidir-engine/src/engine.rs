//! Engine facade.
//!
//! Owns the pool, the connector registry, the single-flight job tracker,
//! and the history store; the trigger surface consumed by the (excluded)
//! HTTP layer lives here and on the orchestrator impl. Built explicitly
//! and passed by reference to dependents; no ambient globals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use std::time::Instant;
use tracing::{info, instrument};

use unidir_connector::{BoxedConnector, ConnectionReport, ConnectorRegistry};
use unidir_core::{EmailConflict, Source, SyncJob};
use unidir_store::{SchemaRegistry, SourceStore};

use crate::aggregate::{DashboardStats, Page, UnifiedAggregator, UnifiedUser, UserFilter};
use crate::conflict::ConflictDetector;
use crate::error::{EngineError, EngineResult};
use crate::history::{HistoryEntry, HistoryStore};
use crate::jobs::JobTracker;

/// Point-in-time status of one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStatus {
    /// The source.
    pub source: Source,
    /// Whether a configured connector is registered.
    pub configured: bool,
    /// Whether the source supports pull-based sync.
    pub syncable: bool,
    /// Whether a sync job is currently running.
    pub running: bool,
    /// Records currently in the source's store.
    pub record_count: i64,
    /// Most recent sync touch across the store.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// The synchronization engine.
pub struct Engine {
    pool: SqlitePool,
    store: SourceStore,
    schema: SchemaRegistry,
    connectors: ConnectorRegistry,
    jobs: JobTracker,
    history: HistoryStore,
    detector: ConflictDetector,
    aggregator: UnifiedAggregator,
}

impl Engine {
    /// Create an engine over the given pool. Call [`Engine::initialize`]
    /// before use.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        let store = SourceStore::new(pool.clone());
        Self {
            schema: SchemaRegistry::new(pool.clone()),
            connectors: ConnectorRegistry::new(),
            jobs: JobTracker::new(),
            history: HistoryStore::new(pool.clone()),
            detector: ConflictDetector::new(store.clone()),
            aggregator: UnifiedAggregator::new(store.clone()),
            store,
            pool,
        }
    }

    /// Create every source's store and the shared history table.
    /// Idempotent.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> EngineResult<()> {
        for source in Source::ALL {
            self.store.initialize(source).await?;
        }
        self.history.initialize().await?;
        info!("Engine initialized");
        Ok(())
    }

    /// Close the pool. Running jobs are abandoned, not awaited.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        info!("Engine shut down");
    }

    /// The engine's pool, shared with the scheduler.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The per-source store.
    #[must_use]
    pub fn store(&self) -> &SourceStore {
        &self.store
    }

    /// The schema registry.
    #[must_use]
    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    /// The run history.
    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub(crate) fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub(crate) fn connectors_ref(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub(crate) fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// Register a connector instance for its source.
    pub async fn register_connector(&self, connector: BoxedConnector) {
        self.connectors.register(connector).await;
    }

    /// Probe a source connector's transport.
    pub async fn test_source_connection(&self, source: Source) -> EngineResult<ConnectionReport> {
        let connector = self
            .connectors
            .get(source)
            .await
            .ok_or(EngineError::NotConfigured { source_kind: source })?;

        let start = Instant::now();
        let mut report = connector.test_connection().await?;
        if report.latency_ms.is_none() {
            report.latency_ms = Some(start.elapsed().as_millis() as i64);
        }
        Ok(report)
    }

    /// The running job for a source, if any.
    pub async fn running_job(&self, source: Source) -> Option<SyncJob> {
        self.jobs.get(source).await
    }

    /// Status of every source.
    pub async fn get_all_source_status(&self) -> EngineResult<Vec<SourceStatus>> {
        let running = self.jobs.running_sources().await;
        let mut statuses = Vec::with_capacity(Source::ALL.len());
        for source in Source::ALL {
            let configured = self
                .connectors
                .get(source)
                .await
                .is_some_and(|c| c.is_configured());
            statuses.push(SourceStatus {
                source,
                configured,
                syncable: source.is_syncable(),
                running: running.contains(&source),
                record_count: self.store.count(source).await?,
                last_synced_at: self.store.latest_sync(source).await?,
            });
        }
        Ok(statuses)
    }

    /// Recompute the cross-source email conflict set.
    pub async fn detect_email_conflicts(&self) -> EngineResult<Vec<EmailConflict>> {
        Ok(self.detector.detect_email_conflicts().await?)
    }

    /// Unified listing across sources.
    pub async fn unified_users(&self, filter: &UserFilter) -> EngineResult<Page<UnifiedUser>> {
        Ok(self.aggregator.unified_users(filter).await?)
    }

    /// Dashboard statistics across every store.
    pub async fn dashboard_stats(&self) -> EngineResult<DashboardStats> {
        let per_source = self.aggregator.source_counts().await?;
        let total_users = per_source.iter().map(|c| c.total).sum();
        let total_active = per_source.iter().map(|c| c.active).sum();
        let conflict_count = self.detector.detect_email_conflicts().await?.len();
        Ok(DashboardStats {
            per_source,
            total_users,
            total_active,
            conflict_count,
        })
    }

    /// Most recent runs across all sources, newest first.
    pub async fn get_sync_history(&self, limit: i64) -> EngineResult<Vec<HistoryEntry>> {
        Ok(self.history.list(limit).await?)
    }

    /// Most recent runs for one source, newest first.
    pub async fn get_sync_history_for_source(
        &self,
        source: Source,
        limit: i64,
    ) -> EngineResult<Vec<HistoryEntry>> {
        Ok(self.history.list_for_source(source, limit).await?)
    }
}
