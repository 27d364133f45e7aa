//! The public facade: `run` starts a fresh workflow, `resume` continues one
//! from its last checkpoint (§4.8).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::circuit_breaker::CircuitBreakerConfig;
use crate::domain::models::config::Config;
use crate::domain::models::phase::AdapterId;
use crate::domain::models::report::Report;
use crate::domain::models::workflow::{WorkflowContext, WorkflowId, WorkflowType};
use crate::domain::ports::adapter::Adapter;
use crate::domain::ports::checkpoint_store::CheckpointStore;
use crate::domain::ports::ledger_sink::LedgerSink;
use crate::services::circuit_breaker::CircuitBreakerTable;
use crate::services::dependency_graph::DependencyGraph;
use crate::services::registry;
use crate::services::scheduler::{Scheduler, SchedulerDeps};

/// Wires the registry, breaker table, checkpoint store, and ledger sink
/// together and drives a workflow to completion.
pub struct Orchestrator {
    config: Config,
    adapters: HashMap<AdapterId, Arc<dyn Adapter>>,
    breakers: Arc<CircuitBreakerTable>,
    checkpoint_store: Arc<dyn CheckpointStore>,
    ledger_sink: Arc<dyn LedgerSink>,
}

impl Orchestrator {
    /// Wires the facade together, rejecting an incomplete adapter map up
    /// front rather than panicking mid-run the first time the scheduler
    /// reaches an unregistered adapter id (every phase in every registry is
    /// checked, since `run` may be asked for either [`WorkflowType`] later).
    pub fn new(
        config: Config,
        adapters: HashMap<AdapterId, Arc<dyn Adapter>>,
        checkpoint_store: Arc<dyn CheckpointStore>,
        ledger_sink: Arc<dyn LedgerSink>,
    ) -> OrchestratorResult<Self> {
        for workflow_type in [WorkflowType::Standard, WorkflowType::Enhanced] {
            let graph = registry::build_graph(workflow_type, &config)?;
            for id in graph.all_ids() {
                let spec = graph.spec(id).expect("id from all_ids must resolve");
                if !adapters.contains_key(&spec.adapter) {
                    return Err(OrchestratorError::AdapterNotRegistered(spec.adapter.clone()));
                }
            }
        }

        let breaker_config = CircuitBreakerConfig {
            threshold: config.breaker.threshold,
            cooldown: chrono::Duration::milliseconds(config.breaker.cooldown_ms as i64),
        };
        Ok(Self {
            config,
            adapters,
            breakers: Arc::new(CircuitBreakerTable::new(breaker_config)),
            checkpoint_store,
            ledger_sink,
        })
    }

    /// Builds the registry for `workflow_type`, allocates a fresh workflow
    /// id, and runs it to completion (§4.8 `run`).
    #[instrument(skip(self))]
    pub async fn run(&self, workflow_type: WorkflowType) -> OrchestratorResult<Report> {
        let graph = registry::build_graph(workflow_type, &self.config)?;
        let workflow_id = WorkflowId::generate();
        let context = WorkflowContext::new(workflow_id, workflow_type, graph.all_ids().cloned());
        self.run_scheduler(graph, context).await
    }

    /// Loads the checkpoint for `workflow_id`, demotes `Running` phases back
    /// to `Pending`, and resumes the graph from there (§4.6, §4.8 `resume`).
    #[instrument(skip(self))]
    pub async fn resume(&self, workflow_id: &WorkflowId) -> OrchestratorResult<Report> {
        let checkpoint = self
            .checkpoint_store
            .load(workflow_id)
            .await?
            .ok_or_else(|| OrchestratorError::CheckpointNotFound(workflow_id.0.clone()))?;
        let context = checkpoint.into_context();
        let graph = registry::build_graph(context.workflow_type, &self.config)?;
        self.run_scheduler(graph, context).await
    }

    async fn run_scheduler(&self, graph: DependencyGraph, context: WorkflowContext) -> OrchestratorResult<Report> {
        let deps = SchedulerDeps::new(
            self.adapters.clone(),
            self.breakers.clone(),
            self.checkpoint_store.clone(),
            self.ledger_sink.clone(),
            self.config.parallelism_cap,
        );
        let scheduler = Scheduler::new(graph, context, deps);
        Ok(scheduler.run_to_completion().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ledger::memory::InMemoryLedgerSink;
    use crate::adapters::memory::InMemoryCheckpointStore;

    #[test]
    fn rejects_an_adapter_map_missing_an_enhanced_only_adapter() {
        let mut adapters = crate::cli::demo_adapters();
        adapters.remove(&AdapterId::new("effects.plan"));

        let err = Orchestrator::new(
            Config::default(),
            adapters,
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryLedgerSink::new()),
        )
        .expect_err("effects.plan is only referenced by the Enhanced registry but must still be validated");

        assert!(matches!(err, OrchestratorError::AdapterNotRegistered(id) if id == AdapterId::new("effects.plan")));
    }

    #[test]
    fn accepts_the_full_demo_adapter_map() {
        Orchestrator::new(
            Config::default(),
            crate::cli::demo_adapters(),
            Arc::new(InMemoryCheckpointStore::new()),
            Arc::new(InMemoryLedgerSink::new()),
        )
        .expect("demo_adapters covers both registries");
    }
}
