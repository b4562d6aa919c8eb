//! # unidir-engine
//!
//! Orchestration core of the unidir identity synchronization engine:
//! single-flight sync jobs per source, cron-like scheduling with bounded
//! retry, cross-source email conflict detection, and the read-only unified
//! aggregation view.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use unidir_engine::prelude::*;
//!
//! let pool = unidir_store::connect("sqlite://unidir.db?mode=rwc").await?;
//! let engine = Arc::new(Engine::new(pool));
//! engine.initialize().await?;
//! engine.register_connector(Arc::new(my_ldap_connector)).await;
//!
//! let scheduler = Scheduler::new(engine.clone(), Arc::new(TokioTriggerBackend::new()));
//! scheduler.initialize().await?;
//! let retry_loop = scheduler.start();
//!
//! let job = engine.sync_source(Source::Ldap, SyncMode::Full, "ops").await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`engine`] - `Engine` facade: status, history, conflicts, aggregation
//! - [`orchestrator`] - sync pipeline and bulk loads (impl on `Engine`)
//! - [`jobs`] - single-flight `JobTracker`
//! - [`scheduler`] - schedules, triggers, retry queue, cron evaluation
//! - [`history`] - append-only run history
//! - [`conflict`] - cross-source email conflict detection
//! - [`aggregate`] - unified read-only listing and dashboard stats
//! - [`error`] - `EngineError` taxonomy

pub mod aggregate;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod history;
pub mod jobs;
pub mod orchestrator;
pub mod scheduler;

pub use aggregate::{
    DashboardStats, Page, SortDirection, SortField, SourceCount, UnifiedAggregator, UnifiedUser,
    UserFilter,
};
pub use conflict::ConflictDetector;
pub use engine::{Engine, SourceStatus};
pub use error::{EngineError, EngineResult};
pub use history::{HistoryEntry, HistoryStore, RunType, ScheduleRunStats};
pub use jobs::JobTracker;
pub use orchestrator::LoadMode;
pub use scheduler::trigger::{
    ManualTriggerBackend, TokioTriggerBackend, TriggerBackend, TriggerCallback, TriggerError,
    TriggerHandle,
};
pub use scheduler::{Schedule, ScheduleRequest, ScheduleStatus, ScheduleStore, Scheduler};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::aggregate::{Page, SortDirection, SortField, UnifiedUser, UserFilter};
    pub use crate::engine::{Engine, SourceStatus};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::history::{HistoryEntry, RunType};
    pub use crate::orchestrator::LoadMode;
    pub use crate::scheduler::trigger::{ManualTriggerBackend, TokioTriggerBackend, TriggerBackend};
    pub use crate::scheduler::{Schedule, ScheduleRequest, ScheduleStatus, Scheduler};
    pub use unidir_connector::{RawRecord, SourceConnector, StaticConnector};
    pub use unidir_core::{JobStatus, Source, SyncJob, SyncMode};
}
