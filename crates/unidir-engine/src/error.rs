//! Engine error taxonomy.
//!
//! Early-exit conditions surface as errors; everything that happens after
//! a job is accepted is captured into the job's results and history entry
//! instead of being thrown past the orchestrator boundary.

use thiserror::Error;
use uuid::Uuid;

use unidir_connector::ConnectorError;
use unidir_core::Source;
use unidir_store::StoreError;

/// Error that can occur at the engine's trigger surface.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The source's connector is missing credentials or not registered.
    /// Not retried automatically.
    #[error("source {source_kind} is not configured")]
    NotConfigured { source_kind: Source },

    /// A job for the source is already running. The caller should retry
    /// later; this is not an error state of the system.
    #[error("sync already in progress for source {source_kind}")]
    SyncInProgress { source_kind: Source },

    /// The source's records arrive via direct creation, not pull.
    #[error("source {source_kind} does not support synchronization")]
    NoSyncSupported { source_kind: Source },

    /// Bulk loads only apply to push sources.
    #[error("source {source_kind} is synchronized from its connector, not loaded")]
    LoadNotSupported { source_kind: Source },

    /// There is no running job to cancel for the source.
    #[error("no sync running for source {source_kind}")]
    NotRunning { source_kind: Source },

    /// Referenced schedule does not exist.
    #[error("schedule not found: {id}")]
    ScheduleNotFound { id: Uuid },

    /// Schedule payload failed validation.
    #[error("invalid schedule: {message}")]
    InvalidSchedule { message: String },

    /// Connector-level failure.
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Create an invalid schedule error.
    pub fn invalid_schedule(message: impl Into<String>) -> Self {
        EngineError::InvalidSchedule {
            message: message.into(),
        }
    }

    /// Check if this is the single-flight guard rejection.
    #[must_use]
    pub fn is_sync_in_progress(&self) -> bool {
        matches!(self, EngineError::SyncInProgress { .. })
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
