//! Field registry persistence.
//!
//! One registry table per source records every known column of that
//! source's record table: name, inferred type, and when it was added. The
//! registry is the single source of truth for which dynamic attributes are
//! legal and what type they hold.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tracing::instrument;

use unidir_core::{DataType, FieldRegistryEntry, Source};

use crate::error::{StoreError, StoreResult};

/// Longest accepted column identifier.
const MAX_FIELD_NAME_LEN: usize = 64;

/// Column names owned by the store itself; never registrable as dynamic
/// fields.
pub const RESERVED_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// Canonical columns seeded into every source's registry at initialization.
pub fn canonical_entries(source: Source) -> Vec<FieldRegistryEntry> {
    vec![
        FieldRegistryEntry::new(source, "email", DataType::Text)
            .with_max_length(255)
            .required(),
        FieldRegistryEntry::new(source, "first_name", DataType::Text).with_max_length(100),
        FieldRegistryEntry::new(source, "last_name", DataType::Text).with_max_length(100),
        FieldRegistryEntry::new(source, "display_name", DataType::Text).with_max_length(255),
        FieldRegistryEntry::new(source, "external_id", DataType::Text).with_max_length(255),
        FieldRegistryEntry::new(source, "is_active", DataType::Boolean),
        FieldRegistryEntry::new(source, "last_synced_at", DataType::DateTime),
    ]
}

/// Registry table name for a source.
#[must_use]
pub fn registry_table(source: Source) -> String {
    format!("field_registry_{}", source.as_str())
}

/// Check that a field name is usable as a column identifier.
pub fn validate_field_name(name: &str) -> StoreResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest || name.len() > MAX_FIELD_NAME_LEN {
        return Err(StoreError::InvalidFieldName(name.to_string()));
    }
    if RESERVED_COLUMNS.contains(&name) {
        return Err(StoreError::InvalidFieldName(format!("{name} is reserved")));
    }
    Ok(())
}

/// Repository for per-source field registries.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    pool: SqlitePool,
}

impl FieldRegistry {
    /// Create a new registry repository.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the registry table for a source and seed the canonical
    /// columns. Idempotent.
    #[instrument(skip(self))]
    pub async fn initialize(&self, source: Source) -> StoreResult<()> {
        let table = registry_table(source);
        let ddl = format!(
            r"
            CREATE TABLE IF NOT EXISTS {table} (
                field_name TEXT PRIMARY KEY,
                data_type TEXT NOT NULL,
                max_length INTEGER,
                is_required INTEGER NOT NULL DEFAULT 0,
                added_at TEXT NOT NULL
            )
            "
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        for entry in canonical_entries(source) {
            self.register(&entry).await?;
        }
        Ok(())
    }

    /// List all registered fields for a source.
    pub async fn list(&self, source: Source) -> StoreResult<Vec<FieldRegistryEntry>> {
        let table = registry_table(source);
        let sql = format!(
            "SELECT field_name, data_type, max_length, is_required, added_at \
             FROM {table} ORDER BY added_at, field_name"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| row_to_entry(source, &row))
            .collect()
    }

    /// Check whether a field is already registered for a source.
    pub async fn contains(&self, source: Source, field_name: &str) -> StoreResult<bool> {
        let table = registry_table(source);
        let sql = format!("SELECT 1 FROM {table} WHERE field_name = ?");
        let row = sqlx::query(&sql)
            .bind(field_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Register a field if absent.
    ///
    /// Returns `true` when the entry was inserted, `false` when the name
    /// was already registered (the existing type wins; re-registration is
    /// a no-op).
    #[instrument(skip(self, entry), fields(source = %entry.source, field = %entry.field_name))]
    pub async fn register(&self, entry: &FieldRegistryEntry) -> StoreResult<bool> {
        let table = registry_table(entry.source);
        let sql = format!(
            "INSERT OR IGNORE INTO {table} \
             (field_name, data_type, max_length, is_required, added_at) \
             VALUES (?, ?, ?, ?, ?)"
        );
        let result = sqlx::query(&sql)
            .bind(&entry.field_name)
            .bind(entry.data_type.as_str())
            .bind(entry.max_length)
            .bind(entry.is_required)
            .bind(entry.added_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_entry(source: Source, row: &sqlx::sqlite::SqliteRow) -> StoreResult<FieldRegistryEntry> {
    let data_type: String = row.try_get("data_type")?;
    let data_type: DataType = data_type
        .parse()
        .map_err(StoreError::CorruptValue)?;
    let added_at: String = row.try_get("added_at")?;
    let added_at = parse_timestamp(&added_at)?;

    Ok(FieldRegistryEntry {
        source,
        field_name: row.try_get("field_name")?,
        data_type,
        max_length: row.try_get("max_length")?,
        is_required: row.try_get("is_required")?,
        added_at,
    })
}

/// Parse a stored ISO-8601 timestamp.
pub fn parse_timestamp(text: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptValue(format!("bad timestamp '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[test]
    fn test_field_name_validation() {
        assert!(validate_field_name("department").is_ok());
        assert!(validate_field_name("jobTitle").is_ok());
        assert!(validate_field_name("_hidden").is_ok());

        assert!(validate_field_name("").is_err());
        assert!(validate_field_name("9lives").is_err());
        assert!(validate_field_name("odata.type").is_err());
        assert!(validate_field_name("drop table").is_err());
        assert!(validate_field_name("id").is_err());
        assert!(validate_field_name(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_initialize_seeds_canonical_columns() {
        let pool = connect_in_memory().await.unwrap();
        let registry = FieldRegistry::new(pool);

        registry.initialize(Source::Directory).await.unwrap();
        let fields = registry.list(Source::Directory).await.unwrap();
        assert_eq!(fields.len(), canonical_entries(Source::Directory).len());
        assert!(registry.contains(Source::Directory, "email").await.unwrap());

        // Second initialize is a no-op.
        registry.initialize(Source::Directory).await.unwrap();
        let again = registry.list(Source::Directory).await.unwrap();
        assert_eq!(again.len(), fields.len());
    }

    #[tokio::test]
    async fn test_register_is_first_writer_wins() {
        let pool = connect_in_memory().await.unwrap();
        let registry = FieldRegistry::new(pool);
        registry.initialize(Source::Upload).await.unwrap();

        let entry = FieldRegistryEntry::new(Source::Upload, "age", DataType::Integer);
        assert!(registry.register(&entry).await.unwrap());

        // Re-registering under a different type is ignored.
        let retyped = FieldRegistryEntry::new(Source::Upload, "age", DataType::Text);
        assert!(!registry.register(&retyped).await.unwrap());

        let fields = registry.list(Source::Upload).await.unwrap();
        let age = fields.iter().find(|f| f.field_name == "age").unwrap();
        assert_eq!(age.data_type, DataType::Integer);
    }
}
