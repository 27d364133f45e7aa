//! SQLite-backed [`CheckpointStore`] (§4.6): one row per workflow, the whole
//! checkpoint kept as a JSON blob rather than normalised into columns, since
//! the contract is just `{workflow_id -> state}`.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::workflow::{Checkpoint, WorkflowId};
use crate::domain::ports::checkpoint_store::CheckpointStore;

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()> {
        let data = serde_json::to_string(checkpoint)?;
        sqlx::query(
            "INSERT INTO checkpoints (workflow_id, workflow_type, data, updated_at)
             VALUES (?, ?, ?, datetime('now'))
             ON CONFLICT(workflow_id) DO UPDATE SET
                workflow_type = excluded.workflow_type,
                data = excluded.data,
                updated_at = excluded.updated_at",
        )
        .bind(&checkpoint.workflow_id.0)
        .bind(checkpoint.workflow_type.to_string())
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(crate::domain::errors::OrchestratorError::Database)?;
        Ok(())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> OrchestratorResult<Option<Checkpoint>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM checkpoints WHERE workflow_id = ?")
            .bind(&workflow_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(crate::domain::errors::OrchestratorError::Database)?;

        row.map(|(data,)| serde_json::from_str(&data).map_err(Into::into)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;
    use crate::adapters::sqlite::migrations::Migrator;
    use crate::domain::models::workflow::{WorkflowContext, WorkflowType};

    async fn store() -> SqliteCheckpointStore {
        let pool = create_test_pool().await.unwrap();
        Migrator::run(&pool).await.unwrap();
        SqliteCheckpointStore::new(pool)
    }

    #[tokio::test]
    async fn round_trips_a_checkpoint() {
        let store = store().await;
        let context = WorkflowContext::new(
            WorkflowId::new("wf-1"),
            WorkflowType::Standard,
            vec![crate::domain::models::phase::PhaseId::new("a")],
        );
        let checkpoint = context.to_checkpoint();
        store.save(&checkpoint).await.unwrap();

        let loaded = store.load(&WorkflowId::new("wf-1")).await.unwrap().unwrap();
        assert_eq!(loaded.workflow_id, WorkflowId::new("wf-1"));
    }

    #[tokio::test]
    async fn missing_checkpoint_is_none() {
        let store = store().await;
        assert!(store.load(&WorkflowId::new("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_is_idempotent_upsert() {
        let store = store().await;
        let mut context = WorkflowContext::new(
            WorkflowId::new("wf-2"),
            WorkflowType::Standard,
            vec![crate::domain::models::phase::PhaseId::new("a")],
        );
        store.save(&context.to_checkpoint()).await.unwrap();
        context.set_status(&crate::domain::models::phase::PhaseId::new("a"), crate::domain::models::workflow::PhaseStatus::Running);
        store.save(&context.to_checkpoint()).await.unwrap();

        let loaded = store.load(&WorkflowId::new("wf-2")).await.unwrap().unwrap();
        assert_eq!(
            loaded.phase_status[&crate::domain::models::phase::PhaseId::new("a")],
            crate::domain::models::workflow::PhaseStatus::Pending
        );
    }
}
