//! Adapter port (§4.7).
//!
//! From the core's perspective an adapter is a single opaque capability.
//! The swarm of concrete adapters (record store, scrapers, generators,
//! publishers, ...) lives entirely outside the orchestration core; only this
//! narrow trait crosses the boundary.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::models::ledger::CostEntry;
use crate::domain::errors::ErrorRecord;

/// Read-only snapshot of the context keys a phase declared in `requires`.
pub type PhaseInputSnapshot = BTreeMap<String, serde_json::Value>;

/// Result of a single adapter invocation (§4.7).
#[derive(Debug, Clone, Default)]
pub struct AdapterOutcome {
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub cost: Option<CostEntry>,
    pub error: Option<ErrorRecord>,
}

impl AdapterOutcome {
    pub fn success(outputs: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            outputs,
            cost: None,
            error: None,
        }
    }

    pub fn failure(error: ErrorRecord) -> Self {
        Self {
            outputs: BTreeMap::new(),
            cost: None,
            error: Some(error),
        }
    }

    pub fn with_cost(mut self, cost: CostEntry) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The narrow interface through which a phase invokes an external capability.
///
/// Adapters are opaque: no shared mutable state, no framework coupling. The
/// core only ever sees [`AdapterOutcome`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable name used in logs and reports.
    fn name(&self) -> &str;

    /// Invoke the capability with the given input snapshot. Implementations
    /// must observe `cancel` promptly and should not exceed `timeout`
    /// themselves — the scheduler applies the timeout independently.
    async fn invoke(
        &self,
        input: &PhaseInputSnapshot,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> AdapterOutcome;
}
