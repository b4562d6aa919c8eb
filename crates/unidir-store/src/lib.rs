//! # unidir-store
//!
//! Per-source persistent stores for the unidir engine, with safe schema
//! evolution. Each identity source owns an isolated record table plus a
//! field registry table describing every known column; unseen fields in
//! incoming batches are type-inferred and added by strictly additive
//! migrations.
//!
//! ## Crate Organization
//!
//! - [`db`] - Pool construction (file-backed and in-memory)
//! - [`store`] - `SourceStore`: initialize, upsert, list, truncate, count
//! - [`registry`] - `FieldRegistry` persistence and canonical seeding
//! - [`inference`] - Type inference vote and value coercion
//! - [`schema`] - `SchemaRegistry`: discovery + additive migrations
//! - [`error`] - `StoreError`

pub mod db;
pub mod error;
pub mod inference;
pub mod registry;
pub mod schema;
pub mod store;

pub use db::{connect, connect_in_memory};
pub use error::{StoreError, StoreResult};
pub use inference::{coerce_value, infer_field, InferredType};
pub use registry::FieldRegistry;
pub use schema::{FailedField, MigrationReport, SchemaRegistry};
pub use store::SourceStore;
