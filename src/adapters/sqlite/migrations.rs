//! Schema migrations (§4.6), run via sqlx's own `migrate!` macro and its
//! `_sqlx_migrations` bookkeeping table, not a hand-rolled runner.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub struct Migrator;

impl Migrator {
    pub async fn run(pool: &SqlitePool) -> Result<(), MigrationError> {
        sqlx::migrate!("./migrations").run(pool).await?;
        Ok(())
    }
}
