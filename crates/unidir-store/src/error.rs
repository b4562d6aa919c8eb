//! Error types for the unidir-store crate.

use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to establish or acquire a database connection.
    #[error("database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A query failed to execute.
    #[error("query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A schema migration for a single field failed.
    ///
    /// Isolated per field; never aborts the rest of a migration batch.
    #[error("schema migration failed for field '{field_name}': {message}")]
    MigrationFailed { field_name: String, message: String },

    /// A dynamic field name is not usable as a column identifier.
    #[error("invalid field name: {0}")]
    InvalidFieldName(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored value could not be interpreted.
    #[error("corrupt stored value: {0}")]
    CorruptValue(String),
}

impl StoreError {
    /// Check if this error indicates a query problem.
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(self, StoreError::QueryFailed(_))
    }

    /// Check if this error indicates a per-field migration failure.
    #[must_use]
    pub fn is_migration_error(&self) -> bool {
        matches!(self, StoreError::MigrationFailed { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::ConnectionFailed(err)
            }
            _ => StoreError::QueryFailed(err),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
