//! Configurable [`Adapter`] used by tests and by the demo CLI path (§4.7).
//!
//! Real capability adapters (scraping, generation, publishing, ...) live
//! outside this crate; `StubAdapter` exists purely so the scheduler, retry,
//! and breaker logic can be exercised deterministically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::ErrorRecord;
use crate::domain::models::ledger::{AttemptOutcome, CostEntry};
use crate::domain::models::phase::AdapterId;
use crate::domain::models::workflow::WorkflowId;
use crate::domain::ports::adapter::{Adapter, AdapterOutcome, PhaseInputSnapshot};

/// What a given invocation attempt should do, keyed by 1-based attempt number.
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    Succeed { outputs: BTreeMap<String, serde_json::Value>, cost: f64 },
    Fail(ErrorRecord),
    Delay(Duration),
}

/// Plays back a fixed script of attempt outcomes, falling back to the last
/// entry once the script is exhausted.
pub struct StubAdapter {
    name: String,
    script: Vec<ScriptedAttempt>,
    calls: AtomicU32,
}

impl StubAdapter {
    pub fn new(name: impl Into<String>, script: Vec<ScriptedAttempt>) -> Self {
        assert!(!script.is_empty(), "StubAdapter script must have at least one entry");
        Self {
            name: name.into(),
            script,
            calls: AtomicU32::new(0),
        }
    }

    /// Always succeeds with the given outputs.
    pub fn always_succeeds(name: impl Into<String>, outputs: BTreeMap<String, serde_json::Value>) -> Self {
        Self::new(name, vec![ScriptedAttempt::Succeed { outputs, cost: 0.0 }])
    }

    /// Always fails with the given error.
    pub fn always_fails(name: impl Into<String>, error: ErrorRecord) -> Self {
        Self::new(name, vec![ScriptedAttempt::Fail(error)])
    }
}

#[async_trait]
impl Adapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _input: &PhaseInputSnapshot, cancel: CancellationToken, _timeout: Duration) -> AdapterOutcome {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let step = self.script.get(call).unwrap_or_else(|| self.script.last().unwrap());

        match step {
            ScriptedAttempt::Succeed { outputs, cost } => {
                let outcome = AdapterOutcome::success(outputs.clone());
                if *cost > 0.0 {
                    outcome.with_cost(CostEntry {
                        workflow_id: WorkflowId::new("unset"),
                        phase_id: String::new(),
                        attempt: 0,
                        started_at: chrono::Utc::now(),
                        ended_at: chrono::Utc::now(),
                        outcome: AttemptOutcome::Succeeded,
                        adapter: AdapterId::new(self.name.clone()),
                        cost_amount: *cost,
                        cost_currency: Some("USD".to_string()),
                        notes: None,
                    })
                } else {
                    outcome
                }
            }
            ScriptedAttempt::Fail(error) => AdapterOutcome::failure(error.clone()),
            ScriptedAttempt::Delay(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => {}
                    _ = cancel.cancelled() => {}
                }
                AdapterOutcome::success(BTreeMap::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_script_then_holds_last_entry() {
        let adapter = StubAdapter::new(
            "test.adapter",
            vec![
                ScriptedAttempt::Fail(ErrorRecord::transient("boom")),
                ScriptedAttempt::Succeed { outputs: BTreeMap::new(), cost: 0.0 },
            ],
        );
        let input = PhaseInputSnapshot::new();
        let first = adapter.invoke(&input, CancellationToken::new(), Duration::from_secs(1)).await;
        assert!(!first.is_success());
        let second = adapter.invoke(&input, CancellationToken::new(), Duration::from_secs(1)).await;
        assert!(second.is_success());
        let third = adapter.invoke(&input, CancellationToken::new(), Duration::from_secs(1)).await;
        assert!(third.is_success());
    }
}
