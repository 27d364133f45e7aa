//! SQLite pool construction (§4.6).

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to prepare database directory: {0}")]
    Directory(#[from] std::io::Error),
    #[error("failed to open sqlite pool: {0}")]
    Pool(#[from] sqlx::Error),
}

/// Opens (creating if absent) a WAL-mode pool at `path`.
pub async fn create_pool(path: &str) -> Result<SqlitePool, ConnectionError> {
    ensure_database_directory(path)?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .map_err(ConnectionError::Pool)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    Ok(pool)
}

/// In-memory pool for tests; each connection gets its own database unless a
/// shared cache URI is used, so tests keep the pool size at one.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
    Ok(pool)
}

fn ensure_database_directory(path: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
