//! Per-source record store.
//!
//! One isolated table per source holds the canonical identity columns plus
//! whatever dynamic columns schema migrations have added. Writes are
//! filtered through the field registry: an attribute without a registered
//! column is silently dropped until a migration registers it, so the
//! migrate-then-upsert ordering enforced by the orchestrator is what makes
//! dynamic data stick.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::instrument;

use unidir_core::{generate_record_id, DataType, FieldRegistryEntry, FieldValue, IdentityRecord, Source};

use crate::error::{StoreError, StoreResult};
use crate::registry::{parse_timestamp, FieldRegistry};

/// Record table name for a source.
#[must_use]
pub fn records_table(source: Source) -> String {
    format!("identity_records_{}", source.as_str())
}

/// Canonical columns handled by the typed core rather than the dynamic bag.
const CANONICAL_COLUMNS: [&str; 7] = [
    "email",
    "first_name",
    "last_name",
    "display_name",
    "external_id",
    "is_active",
    "last_synced_at",
];

fn is_canonical(name: &str) -> bool {
    CANONICAL_COLUMNS.contains(&name)
}

/// Repository over the per-source record tables.
#[derive(Debug, Clone)]
pub struct SourceStore {
    pool: SqlitePool,
    registry: FieldRegistry,
}

impl SourceStore {
    /// Create a new store over the given pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        let registry = FieldRegistry::new(pool.clone());
        Self { pool, registry }
    }

    /// Access the field registry.
    #[must_use]
    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Create the record table, its indexes, and the field registry for a
    /// source. Idempotent.
    #[instrument(skip(self))]
    pub async fn initialize(&self, source: Source) -> StoreResult<()> {
        let table = records_table(source);
        let ddl = format!(
            r"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                first_name TEXT,
                last_name TEXT,
                display_name TEXT,
                external_id TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_synced_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let email_index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_email ON {table} (lower(email))"
        );
        sqlx::query(&email_index).execute(&self.pool).await?;

        let synced_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_last_synced ON {table} (last_synced_at)"
        );
        sqlx::query(&synced_index).execute(&self.pool).await?;

        self.registry.initialize(source).await
    }

    /// Registered fields for a source.
    pub async fn field_registry(&self, source: Source) -> StoreResult<Vec<FieldRegistryEntry>> {
        self.registry.list(source).await
    }

    /// Number of records in a source's store.
    pub async fn count(&self, source: Source) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", records_table(source));
        let row: (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    /// Most recent `last_synced_at` across a source's records.
    pub async fn latest_sync(
        &self,
        source: Source,
    ) -> StoreResult<Option<chrono::DateTime<Utc>>> {
        let sql = format!(
            "SELECT MAX(last_synced_at) FROM {}",
            records_table(source)
        );
        let row: (Option<String>,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        row.0.as_deref().map(parse_timestamp).transpose()
    }

    /// Delete every record in a source's store.
    ///
    /// Used only by replace-mode bulk loads; the field registry survives.
    #[instrument(skip(self))]
    pub async fn truncate(&self, source: Source) -> StoreResult<()> {
        let sql = format!("DELETE FROM {}", records_table(source));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// List records, ordered by email.
    pub async fn get_records(
        &self,
        source: Source,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<IdentityRecord>> {
        let fields = self.registry.list(source).await?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY lower(email) LIMIT ? OFFSET ?",
            records_table(source)
        );
        let rows = sqlx::query(&sql)
            .bind(limit.unwrap_or(-1))
            .bind(offset.unwrap_or(0))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row_to_record(source, row, &fields))
            .collect()
    }

    /// Look up one record by id.
    pub async fn get_record(&self, source: Source, id: &str) -> StoreResult<Option<IdentityRecord>> {
        let fields = self.registry.list(source).await?;
        let sql = format!("SELECT * FROM {} WHERE id = ?", records_table(source));
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref()
            .map(|row| row_to_record(source, row, &fields))
            .transpose()
    }

    /// Look up one record by its source-native key.
    pub async fn find_by_external_id(
        &self,
        source: Source,
        external_id: &str,
    ) -> StoreResult<Option<IdentityRecord>> {
        let fields = self.registry.list(source).await?;
        let sql = format!(
            "SELECT * FROM {} WHERE external_id = ? LIMIT 1",
            records_table(source)
        );
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref()
            .map(|row| row_to_record(source, row, &fields))
            .transpose()
    }

    /// Insert or update a record.
    ///
    /// Matches an existing row by `id` when present, otherwise inserts
    /// with a freshly generated id and `created_at`. `updated_at` is
    /// always refreshed. Dynamic attributes without a registered column
    /// are dropped before writing.
    #[instrument(skip(self, record), fields(source = %source, email = %record.email))]
    pub async fn upsert(
        &self,
        source: Source,
        record: &IdentityRecord,
    ) -> StoreResult<IdentityRecord> {
        let fields = self.registry.list(source).await?;
        let attributes = filter_registered(&record.attributes, &fields);

        let exists = if record.id.is_empty() {
            false
        } else {
            self.get_record(source, &record.id).await?.is_some()
        };

        let id = if exists {
            self.update_row(source, record, &attributes).await?;
            record.id.clone()
        } else {
            self.insert_row(source, record, &attributes).await?
        };

        self.get_record(source, &id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("record {id} after upsert")))
    }

    async fn insert_row(
        &self,
        source: Source,
        record: &IdentityRecord,
        attributes: &BTreeMap<String, FieldValue>,
    ) -> StoreResult<String> {
        let id = generate_record_id(source);
        let now = Utc::now().to_rfc3339();

        let mut columns = vec![
            "id",
            "email",
            "first_name",
            "last_name",
            "display_name",
            "external_id",
            "is_active",
            "last_synced_at",
            "created_at",
            "updated_at",
        ]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
        for name in attributes.keys() {
            columns.push(format!("\"{name}\""));
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            records_table(source),
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(&id)
            .bind(&record.email)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.display_name)
            .bind(&record.external_id)
            .bind(record.is_active)
            .bind(record.last_synced_at.map(|dt| dt.to_rfc3339()))
            .bind(&now)
            .bind(&now);
        for value in attributes.values() {
            query = bind_field_value(query, value);
        }
        query.execute(&self.pool).await?;

        Ok(id)
    }

    async fn update_row(
        &self,
        source: Source,
        record: &IdentityRecord,
        attributes: &BTreeMap<String, FieldValue>,
    ) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();

        let mut assignments = vec![
            "email = ?".to_string(),
            "first_name = ?".to_string(),
            "last_name = ?".to_string(),
            "display_name = ?".to_string(),
            "external_id = ?".to_string(),
            "is_active = ?".to_string(),
            "last_synced_at = ?".to_string(),
            "updated_at = ?".to_string(),
        ];
        for name in attributes.keys() {
            assignments.push(format!("\"{name}\" = ?"));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            records_table(source),
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(&record.email)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(&record.display_name)
            .bind(&record.external_id)
            .bind(record.is_active)
            .bind(record.last_synced_at.map(|dt| dt.to_rfc3339()))
            .bind(&now);
        for value in attributes.values() {
            query = bind_field_value(query, value);
        }
        query.bind(&record.id).execute(&self.pool).await?;

        Ok(())
    }
}

/// Keep only attributes whose name has a registered dynamic column.
fn filter_registered(
    attributes: &BTreeMap<String, FieldValue>,
    fields: &[FieldRegistryEntry],
) -> BTreeMap<String, FieldValue> {
    attributes
        .iter()
        .filter(|(name, _)| {
            !is_canonical(name) && fields.iter().any(|f| &f.field_name == *name)
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

type SqliteQuery<'q> =
    sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_field_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Integer(i) => query.bind(*i),
        FieldValue::Real(r) => query.bind(*r),
        FieldValue::Boolean(b) => query.bind(*b),
        FieldValue::DateTime(dt) => query.bind(dt.to_rfc3339()),
    }
}

fn row_to_record(
    source: Source,
    row: &SqliteRow,
    fields: &[FieldRegistryEntry],
) -> StoreResult<IdentityRecord> {
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let last_synced_at: Option<String> = row.try_get("last_synced_at")?;

    let mut attributes = BTreeMap::new();
    for field in fields {
        if is_canonical(&field.field_name) {
            continue;
        }
        if let Some(value) = read_dynamic(row, field)? {
            attributes.insert(field.field_name.clone(), value);
        }
    }

    Ok(IdentityRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        display_name: row.try_get("display_name")?,
        is_active: row.try_get("is_active")?,
        last_synced_at: last_synced_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        source,
        external_id: row.try_get("external_id")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        attributes,
    })
}

fn read_dynamic(row: &SqliteRow, field: &FieldRegistryEntry) -> StoreResult<Option<FieldValue>> {
    let name = field.field_name.as_str();
    let value = match field.data_type {
        DataType::Text => row
            .try_get::<Option<String>, _>(name)?
            .map(FieldValue::Text),
        DataType::Integer => row
            .try_get::<Option<i64>, _>(name)?
            .map(FieldValue::Integer),
        DataType::Real => row.try_get::<Option<f64>, _>(name)?.map(FieldValue::Real),
        DataType::Boolean => row
            .try_get::<Option<bool>, _>(name)?
            .map(FieldValue::Boolean),
        DataType::DateTime => row
            .try_get::<Option<String>, _>(name)?
            .as_deref()
            .map(parse_timestamp)
            .transpose()?
            .map(FieldValue::DateTime),
    };
    Ok(value)
}
