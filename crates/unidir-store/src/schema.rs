//! Schema registry: field discovery and additive migrations.
//!
//! Inspects a batch of incoming raw records, diffs their field set against
//! the source's field registry, infers a type for each unseen field, and
//! applies additive `ALTER TABLE` migrations. Migrations never retype or
//! remove an existing column.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use tracing::{info, instrument, warn};

use unidir_connector::RawRecord;
use unidir_core::{FieldRegistryEntry, Source};

use crate::error::StoreResult;
use crate::inference::infer_field;
use crate::registry::{validate_field_name, FieldRegistry, RESERVED_COLUMNS};
use crate::store::records_table;

/// A field whose migration failed.
#[derive(Debug, Clone)]
pub struct FailedField {
    /// The field that could not be migrated.
    pub field_name: String,
    /// Why.
    pub error: String,
}

/// Outcome of a migration batch.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Entries now present in the registry (includes no-op re-applies).
    pub applied: Vec<FieldRegistryEntry>,
    /// Per-field failures; the rest of the batch still migrates.
    pub failed: Vec<FailedField>,
}

impl MigrationReport {
    /// Whether anything failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Discovers unseen fields and applies additive schema migrations.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    pool: SqlitePool,
    registry: FieldRegistry,
}

impl SchemaRegistry {
    /// Create a new schema registry.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        let registry = FieldRegistry::new(pool.clone());
        Self { pool, registry }
    }

    /// Access the underlying field registry.
    #[must_use]
    pub fn fields(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Diff a batch's field set against the registry and infer types for
    /// every unseen field with at least one observable value.
    #[instrument(skip(self, records), fields(batch = records.len()))]
    pub async fn discover_new_fields(
        &self,
        source: Source,
        records: &[RawRecord],
    ) -> StoreResult<Vec<FieldRegistryEntry>> {
        let known: HashSet<String> = self
            .registry
            .list(source)
            .await?
            .into_iter()
            .map(|entry| entry.field_name)
            .collect();

        // Collect observed values per unseen field, preserving name order.
        // Store-owned bookkeeping columns can never become dynamic fields.
        let mut observed: BTreeMap<&str, Vec<&Value>> = BTreeMap::new();
        for record in records {
            for (name, value) in record.iter() {
                if known.contains(name.as_str()) || RESERVED_COLUMNS.contains(&name.as_str()) {
                    continue;
                }
                observed.entry(name).or_default().push(value);
            }
        }

        let mut discovered = Vec::new();
        for (name, values) in observed {
            // Zero non-null values across the batch: not yet inferable.
            let Some(inferred) = infer_field(name, &values) else {
                continue;
            };
            let mut entry = FieldRegistryEntry::new(source, name, inferred.data_type);
            entry.max_length = inferred.max_length;
            discovered.push(entry);
        }

        if !discovered.is_empty() {
            info!(
                source = %source,
                count = discovered.len(),
                "Discovered new fields"
            );
        }
        Ok(discovered)
    }

    /// Apply additive migrations for the given entries.
    ///
    /// Already-registered names are no-ops reported as applied. A failure
    /// for one field is recorded and does not abort the rest.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub async fn apply_migrations(
        &self,
        source: Source,
        entries: Vec<FieldRegistryEntry>,
    ) -> StoreResult<MigrationReport> {
        let mut report = MigrationReport::default();

        for entry in entries {
            if self.registry.contains(source, &entry.field_name).await? {
                report.applied.push(entry);
                continue;
            }
            match self.add_column(source, &entry).await {
                Ok(()) => {
                    self.registry.register(&entry).await?;
                    report.applied.push(entry);
                }
                Err(e) => {
                    warn!(
                        source = %source,
                        field = %entry.field_name,
                        error = %e,
                        "Field migration failed"
                    );
                    report.failed.push(FailedField {
                        field_name: entry.field_name,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Discover and apply in one call.
    pub async fn auto_migrate(
        &self,
        source: Source,
        records: &[RawRecord],
    ) -> StoreResult<MigrationReport> {
        let discovered = self.discover_new_fields(source, records).await?;
        self.apply_migrations(source, discovered).await
    }

    async fn add_column(&self, source: Source, entry: &FieldRegistryEntry) -> StoreResult<()> {
        validate_field_name(&entry.field_name)?;
        let table = records_table(source);
        let ddl = format!(
            "ALTER TABLE {table} ADD COLUMN \"{}\" {}",
            entry.field_name,
            entry.data_type.sql_type()
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;
    use crate::store::SourceStore;
    use unidir_core::DataType;

    async fn setup(source: Source) -> (SchemaRegistry, SourceStore) {
        let pool = connect_in_memory().await.unwrap();
        let store = SourceStore::new(pool.clone());
        store.initialize(source).await.unwrap();
        (SchemaRegistry::new(pool), store)
    }

    #[tokio::test]
    async fn test_discover_skips_known_and_uninferable() {
        let (schema, _store) = setup(Source::Ldap).await;

        let records = vec![
            RawRecord::new()
                .with("email", "a@x.com") // canonical, already registered
                .with("department", "Engineering")
                .with("ghost", serde_json::Value::Null),
            RawRecord::new().with("department", "Sales"),
        ];

        let discovered = schema
            .discover_new_fields(Source::Ldap, &records)
            .await
            .unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].field_name, "department");
        assert_eq!(discovered[0].data_type, DataType::Text);
    }

    #[tokio::test]
    async fn test_auto_migrate_is_idempotent() {
        let (schema, _store) = setup(Source::Directory).await;

        let records = vec![RawRecord::new()
            .with("department", "Engineering")
            .with("employee_number", "42")];

        let first = schema
            .auto_migrate(Source::Directory, &records)
            .await
            .unwrap();
        assert_eq!(first.applied.len(), 2);
        assert!(!first.has_failures());

        let second = schema
            .auto_migrate(Source::Directory, &records)
            .await
            .unwrap();
        assert!(second.applied.is_empty());
        assert!(!second.has_failures());

        let fields = schema.fields().list(Source::Directory).await.unwrap();
        let count = fields
            .iter()
            .filter(|f| f.field_name == "department")
            .count();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_bad_field_name_fails_without_aborting_batch() {
        let (schema, _store) = setup(Source::Upload).await;

        let records = vec![RawRecord::new()
            .with("odata.type", "user")
            .with("department", "Engineering")];

        let report = schema.auto_migrate(Source::Upload, &records).await.unwrap();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].field_name, "department");
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].field_name, "odata.type");
    }

    #[tokio::test]
    async fn test_reapplying_registered_field_is_noop_success() {
        let (schema, _store) = setup(Source::Manual).await;

        let entry = FieldRegistryEntry::new(Source::Manual, "cost_center", DataType::Integer);
        let report = schema
            .apply_migrations(Source::Manual, vec![entry.clone()])
            .await
            .unwrap();
        assert_eq!(report.applied.len(), 1);

        let report = schema
            .apply_migrations(Source::Manual, vec![entry])
            .await
            .unwrap();
        assert_eq!(report.applied.len(), 1);
        assert!(!report.has_failures());
    }
}
