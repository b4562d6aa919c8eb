//! Database pool construction.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::{StoreError, StoreResult};

/// Default pool size for file-backed databases.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Open a file-backed database pool.
///
/// `url` is a sqlx SQLite URL, e.g. `sqlite://unidir.db?mode=rwc`.
pub async fn connect(url: &str) -> StoreResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_MAX_CONNECTIONS)
        .connect_with(
            url.parse::<sqlx::sqlite::SqliteConnectOptions>()
                .map_err(StoreError::ConnectionFailed)?
                .statement_cache_capacity(0),
        )
        .await
        .map_err(StoreError::ConnectionFailed)?;

    info!(url = %url, "Opened database pool");
    Ok(pool)
}

/// Open an in-memory database.
///
/// Pinned to a single connection: each SQLite in-memory connection is its
/// own database, so a larger pool would hand out empty databases.
pub async fn connect_in_memory() -> StoreResult<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            "sqlite::memory:"
                .parse::<sqlx::sqlite::SqliteConnectOptions>()
                .map_err(StoreError::ConnectionFailed)?
                .statement_cache_capacity(0),
        )
        .await
        .map_err(StoreError::ConnectionFailed)
}
