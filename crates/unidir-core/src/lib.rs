//! # unidir-core
//!
//! Shared vocabulary for the unidir identity synchronization engine:
//! source kinds, the canonical identity record, typed attribute values,
//! field registry entries, sync job lifecycle types, and conflict
//! projections.
//!
//! ## Crate Organization
//!
//! - [`source`] - Identity source kinds and their capabilities
//! - [`value`] - `DataType` and the `FieldValue` tagged union
//! - [`record`] - The canonical `IdentityRecord`
//! - [`field`] - `FieldRegistryEntry`
//! - [`job`] - Sync job lifecycle (`SyncJob`, `JobStatus`, `SyncResults`)
//! - [`conflict`] - Cross-source email collision projections

pub mod conflict;
pub mod field;
pub mod job;
pub mod record;
pub mod source;
pub mod value;

pub use conflict::{ConflictingUser, EmailConflict};
pub use field::FieldRegistryEntry;
pub use job::{JobStatus, SyncJob, SyncMode, SyncResults, SyncSummary};
pub use record::{generate_record_id, IdentityRecord};
pub use source::Source;
pub use value::{DataType, FieldValue};
