//! Checkpoint store port (§4.6).

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::workflow::{Checkpoint, WorkflowId};

/// Durable key-value store of `{workflow_id -> WorkflowState}`.
///
/// Writes must be atomic: either the whole checkpoint lands or none of it
/// does (rename-over semantics or a transaction, §4.6).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()>;
    async fn load(&self, workflow_id: &WorkflowId) -> OrchestratorResult<Option<Checkpoint>>;
}
