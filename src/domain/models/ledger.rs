//! Cost & metrics ledger entries (§4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::phase::AdapterId;
use crate::domain::models::workflow::WorkflowId;

/// Terminal outcome of a single attempt, distinct from [`super::workflow::PhaseStatus`]
/// (a `Retrying` attempt is not yet a phase-level terminal state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed,
    Retrying,
}

/// One append-only record per attempt, including retries (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEntry {
    pub workflow_id: WorkflowId,
    pub phase_id: String,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub adapter: AdapterId,
    pub cost_amount: f64,
    pub cost_currency: Option<String>,
    pub notes: Option<String>,
}

/// Aggregated view over a ledger, produced for the run [`super::report::Report`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub grand_total: f64,
    pub by_adapter: std::collections::BTreeMap<String, f64>,
    pub by_phase: std::collections::BTreeMap<String, f64>,
    pub entry_count: usize,
}

impl LedgerSummary {
    pub fn from_entries(entries: &[CostEntry]) -> Self {
        let mut summary = LedgerSummary {
            entry_count: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            summary.grand_total += entry.cost_amount;
            *summary.by_adapter.entry(entry.adapter.0.clone()).or_insert(0.0) += entry.cost_amount;
            *summary.by_phase.entry(entry.phase_id.clone()).or_insert(0.0) += entry.cost_amount;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(phase: &str, adapter: &str, cost: f64) -> CostEntry {
        CostEntry {
            workflow_id: WorkflowId::new("wf-1"),
            phase_id: phase.to_string(),
            attempt: 1,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            outcome: AttemptOutcome::Succeeded,
            adapter: AdapterId::new(adapter),
            cost_amount: cost,
            cost_currency: Some("USD".to_string()),
            notes: None,
        }
    }

    #[test]
    fn summary_sums_total_cost() {
        let entries = vec![entry("a", "x", 1.5), entry("b", "x", 2.5), entry("c", "y", 1.0)];
        let summary = LedgerSummary::from_entries(&entries);
        assert!((summary.grand_total - 5.0).abs() < f64::EPSILON);
        assert_eq!(summary.entry_count, 3);
        assert!((summary.by_adapter["x"] - 4.0).abs() < f64::EPSILON);
        assert!((summary.by_phase["c"] - 1.0).abs() < f64::EPSILON);
    }
}
