//! In-memory [`CheckpointStore`], the default for unit tests and for
//! workflows that opt out of durability entirely.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::workflow::{Checkpoint, WorkflowId};
use crate::domain::ports::checkpoint_store::CheckpointStore;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<WorkflowId, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> OrchestratorResult<()> {
        self.checkpoints
            .write()
            .await
            .insert(checkpoint.workflow_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: &WorkflowId) -> OrchestratorResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().await.get(workflow_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::phase::PhaseId;
    use crate::domain::models::workflow::{WorkflowContext, WorkflowType};

    #[tokio::test]
    async fn round_trips_a_checkpoint() {
        let store = InMemoryCheckpointStore::new();
        let context = WorkflowContext::new(WorkflowId::new("wf"), WorkflowType::Standard, vec![PhaseId::new("a")]);
        store.save(&context.to_checkpoint()).await.unwrap();
        let loaded = store.load(&WorkflowId::new("wf")).await.unwrap();
        assert!(loaded.is_some());
    }

    #[tokio::test]
    async fn unknown_workflow_is_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load(&WorkflowId::new("ghost")).await.unwrap().is_none());
    }
}
