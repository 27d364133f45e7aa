//! Domain model types for the orchestration core.

pub mod circuit_breaker;
pub mod config;
pub mod ledger;
pub mod phase;
pub mod report;
pub mod workflow;

pub use circuit_breaker::{Admission, CircuitBreakerConfig, CircuitBreakerState, CircuitState};
pub use config::Config;
pub use ledger::{AttemptOutcome, CostEntry, LedgerSummary};
pub use phase::{AdapterId, ConcurrencyGroup, Criticality, PhaseId, PhaseSpec, RetryPolicy};
pub use report::{Outcome, PhaseReport, Report};
pub use workflow::{Checkpoint, PhaseStatus, PhaseTiming, WorkflowContext, WorkflowId, WorkflowType};
