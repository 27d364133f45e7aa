//! The run report returned by the facade (§4.8).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::errors::ErrorRecord;
use crate::domain::models::ledger::LedgerSummary;
use crate::domain::models::phase::PhaseId;
use crate::domain::models::workflow::{PhaseStatus, WorkflowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase_id: PhaseId,
    pub status: PhaseStatus,
    pub attempts: u32,
    pub last_error: Option<ErrorRecord>,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub workflow_id: WorkflowId,
    pub outcome: Outcome,
    pub total_duration: Duration,
    pub phase_reports: Vec<PhaseReport>,
    pub ledger_summary: LedgerSummary,
}

impl Report {
    /// Every `BestEffort` phase that did not reach `Succeeded`, surfaced
    /// explicitly rather than elided (§7 "Partial successes are reported
    /// explicitly").
    pub fn non_fatal_failures(&self) -> Vec<&PhaseReport> {
        self.phase_reports
            .iter()
            .filter(|p| matches!(p.status, PhaseStatus::Failed | PhaseStatus::Skipped))
            .collect()
    }
}
