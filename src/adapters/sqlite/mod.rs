//! SQLite adapters: connection setup, embedded migrations, and the
//! checkpoint store implementation.

pub mod checkpoint_store;
pub mod connection;
pub mod migrations;

pub use checkpoint_store::SqliteCheckpointStore;
pub use connection::{create_pool, create_test_pool, ConnectionError};
pub use migrations::{MigrationError, Migrator};

use sqlx::SqlitePool;

/// Opens the pool at `path` and runs pending migrations, ready for
/// [`SqliteCheckpointStore::new`].
pub async fn initialize_database(path: &str) -> Result<SqlitePool, InitError> {
    let pool = create_pool(path).await?;
    Migrator::run(&pool).await?;
    Ok(pool)
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}
