//! Workflow context, status machine, and the checkpointed subset of it (§3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::ErrorRecord;
use crate::domain::models::ledger::CostEntry;
use crate::domain::models::phase::PhaseId;

/// Opaque, unique-per-run identifier (§3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Timestamp+random generation, matching the "monotonically-unique"
    /// requirement without pulling in a UUID dependency for this one id.
    pub fn generate() -> Self {
        let ts = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let rand_suffix: u32 = uuid::Uuid::new_v4().as_u128() as u32;
        Self(format!("wf-{ts:x}-{rand_suffix:08x}"))
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Selects which registry of phases the facade builds (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowType {
    Standard,
    Enhanced,
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowType::Standard => write!(f, "standard"),
            WorkflowType::Enhanced => write!(f, "enhanced"),
        }
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(WorkflowType::Standard),
            "enhanced" => Ok(WorkflowType::Enhanced),
            other => Err(format!("unknown workflow type '{other}'")),
        }
    }
}

/// Per-phase status machine. Transitions are restricted to
/// `Pending -> Running -> (Succeeded | Failed | Skipped)`, never back (I1, P6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Succeeded | PhaseStatus::Failed | PhaseStatus::Skipped)
    }

    /// Validates a transition against the state machine in §4.1/§3.
    pub fn can_transition_to(self, next: PhaseStatus) -> bool {
        use PhaseStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Skipped)
        )
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Wall-clock bounds recorded for a phase attempt (§3 `timings`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Owned by the scheduler; phases only ever see read-only snapshots of
/// `outputs` restricted to the keys they declared in `requires` (§3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: WorkflowId,
    pub workflow_type: WorkflowType,
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub phase_status: BTreeMap<PhaseId, PhaseStatus>,
    pub attempts: BTreeMap<PhaseId, u32>,
    pub timings: BTreeMap<PhaseId, PhaseTiming>,
    pub errors: BTreeMap<PhaseId, ErrorRecord>,
    pub ledger: Vec<CostEntry>,
}

impl WorkflowContext {
    pub fn new(workflow_id: WorkflowId, workflow_type: WorkflowType, phase_ids: impl IntoIterator<Item = PhaseId>) -> Self {
        let phase_status = phase_ids.into_iter().map(|id| (id, PhaseStatus::Pending)).collect();
        Self {
            workflow_id,
            workflow_type,
            outputs: BTreeMap::new(),
            phase_status,
            attempts: BTreeMap::new(),
            timings: BTreeMap::new(),
            errors: BTreeMap::new(),
            ledger: Vec::new(),
        }
    }

    pub fn status_of(&self, phase: &PhaseId) -> PhaseStatus {
        self.phase_status.get(phase).copied().unwrap_or(PhaseStatus::Pending)
    }

    /// Enforces I1/P6: panics (a programmer error, not a runtime one) if an
    /// illegal transition is attempted — the scheduler must never request one.
    pub fn set_status(&mut self, phase: &PhaseId, next: PhaseStatus) {
        let current = self.status_of(phase);
        assert!(
            current.can_transition_to(next),
            "illegal phase transition for {phase}: {current} -> {next}"
        );
        self.phase_status.insert(phase.clone(), next);
    }

    pub fn all_terminal(&self) -> bool {
        self.phase_status.values().all(|s| s.is_terminal())
    }

    /// Total cost recorded in the ledger (P4, invariant 6).
    pub fn total_cost(&self) -> f64 {
        self.ledger.iter().map(|e| e.cost_amount).sum()
    }

    /// Strips transient, non-serialisable fields for persistence (§3
    /// `Checkpoint`, §6 persisted state layout). `Running` phases are
    /// demoted to `Pending` so a resume re-dispatches them.
    pub fn to_checkpoint(&self) -> Checkpoint {
        let phase_status = self
            .phase_status
            .iter()
            .map(|(id, status)| {
                let persisted = if *status == PhaseStatus::Running {
                    PhaseStatus::Pending
                } else {
                    *status
                };
                (id.clone(), persisted)
            })
            .collect();

        Checkpoint {
            workflow_id: self.workflow_id.clone(),
            workflow_type: self.workflow_type,
            outputs: self.outputs.clone(),
            phase_status,
            attempts: self.attempts.clone(),
            timings: self.timings.clone(),
            errors: self.errors.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

/// Durable, serialised subset of [`WorkflowContext`] (§3, §4.6, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub workflow_id: WorkflowId,
    pub workflow_type: WorkflowType,
    pub outputs: BTreeMap<String, serde_json::Value>,
    pub phase_status: BTreeMap<PhaseId, PhaseStatus>,
    pub attempts: BTreeMap<PhaseId, u32>,
    pub timings: BTreeMap<PhaseId, PhaseTiming>,
    pub errors: BTreeMap<PhaseId, ErrorRecord>,
    pub ledger: Vec<CostEntry>,
}

impl Checkpoint {
    /// Rehydrates a context from a checkpoint, ready to feed back into the
    /// scheduler on `resume` (§4.6).
    pub fn into_context(self) -> WorkflowContext {
        WorkflowContext {
            workflow_id: self.workflow_id,
            workflow_type: self.workflow_type,
            outputs: self.outputs,
            phase_status: self.phase_status,
            attempts: self.attempts,
            timings: self.timings,
            errors: self.errors,
            ledger: self.ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> WorkflowContext {
        WorkflowContext::new(
            WorkflowId::new("wf-1"),
            WorkflowType::Standard,
            vec![PhaseId::new("a"), PhaseId::new("b")],
        )
    }

    #[test]
    fn new_context_starts_all_pending() {
        let c = ctx();
        assert_eq!(c.status_of(&PhaseId::new("a")), PhaseStatus::Pending);
        assert!(!c.all_terminal());
    }

    #[test]
    fn legal_transition_succeeds() {
        let mut c = ctx();
        c.set_status(&PhaseId::new("a"), PhaseStatus::Running);
        c.set_status(&PhaseId::new("a"), PhaseStatus::Succeeded);
        assert_eq!(c.status_of(&PhaseId::new("a")), PhaseStatus::Succeeded);
    }

    #[test]
    #[should_panic(expected = "illegal phase transition")]
    fn regression_is_rejected() {
        let mut c = ctx();
        c.set_status(&PhaseId::new("a"), PhaseStatus::Running);
        c.set_status(&PhaseId::new("a"), PhaseStatus::Succeeded);
        c.set_status(&PhaseId::new("a"), PhaseStatus::Pending);
    }

    #[test]
    fn checkpoint_demotes_running_to_pending() {
        let mut c = ctx();
        c.set_status(&PhaseId::new("a"), PhaseStatus::Running);
        let checkpoint = c.to_checkpoint();
        assert_eq!(checkpoint.phase_status[&PhaseId::new("a")], PhaseStatus::Pending);
    }
}
