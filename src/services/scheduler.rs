//! The scheduler: drives the graph to a terminal state (§4.1).

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{ErrorKind, ErrorRecord};
use crate::domain::models::circuit_breaker::Admission;
use crate::domain::models::ledger::{AttemptOutcome, CostEntry, LedgerSummary};
use crate::domain::models::phase::{AdapterId, Criticality, PhaseId, PhaseSpec};
use crate::domain::models::report::{Outcome, PhaseReport, Report};
use crate::domain::models::workflow::{PhaseStatus, PhaseTiming, WorkflowContext};
use crate::domain::ports::adapter::{Adapter, AdapterOutcome};
use crate::domain::ports::checkpoint_store::CheckpointStore;
use crate::domain::ports::ledger_sink::LedgerSink;
use crate::services::circuit_breaker::CircuitBreakerTable;
use crate::services::dependency_graph::DependencyGraph;
use crate::services::retry::{self, JitterSource, RetryDecision, RngJitter};

/// How often the scheduler re-checks breaker-deferred phases when nothing
/// else is in flight.
const BREAKER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace period a cancelled phase is given before it is abandoned (§5).
const CANCELLATION_GRACE: Duration = Duration::from_secs(5);

/// Shared, cheaply-cloned dependencies handed to every spawned phase task.
pub struct SchedulerDeps {
    pub adapters: HashMap<AdapterId, Arc<dyn Adapter>>,
    pub breakers: Arc<CircuitBreakerTable>,
    pub checkpoint_store: Arc<dyn CheckpointStore>,
    pub ledger_sink: Arc<dyn LedgerSink>,
    pub jitter: Arc<dyn JitterSource>,
    pub parallelism_cap: Option<usize>,
}

impl SchedulerDeps {
    pub fn new(
        adapters: HashMap<AdapterId, Arc<dyn Adapter>>,
        breakers: Arc<CircuitBreakerTable>,
        checkpoint_store: Arc<dyn CheckpointStore>,
        ledger_sink: Arc<dyn LedgerSink>,
        parallelism_cap: Option<usize>,
    ) -> Self {
        Self {
            adapters,
            breakers,
            checkpoint_store,
            ledger_sink,
            jitter: Arc::new(RngJitter),
            parallelism_cap,
        }
    }
}

enum PhaseOutcome {
    Succeeded { outputs: BTreeMap<String, serde_json::Value> },
    Failed { error: ErrorRecord, is_abort: bool },
}

struct PhaseCompletion {
    phase_id: PhaseId,
    outcome: PhaseOutcome,
    attempts: u32,
    started_at: chrono::DateTime<Utc>,
    ended_at: chrono::DateTime<Utc>,
    cost_entries: Vec<CostEntry>,
}

pub struct Scheduler {
    graph: DependencyGraph,
    context: WorkflowContext,
    deps: SchedulerDeps,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(graph: DependencyGraph, context: WorkflowContext, deps: SchedulerDeps) -> Self {
        Self {
            graph,
            context,
            deps,
            cancel: CancellationToken::new(),
        }
    }

    /// Drives the graph until every phase is terminal, persisting a
    /// checkpoint after every status change (§4.1, §4.6, P5).
    #[instrument(skip(self), fields(workflow_id = %self.context.workflow_id))]
    pub async fn run_to_completion(mut self) -> Report {
        let start = Instant::now();
        let (tx, mut rx) = mpsc::channel::<PhaseCompletion>(64);
        let mut in_flight: usize = 0;
        let mut deferred: VecDeque<PhaseId> = VecDeque::new();
        let mut fail_fast = false;

        if self.graph.is_empty() {
            self.persist_checkpoint().await;
            return self.build_report(Outcome::Success, start.elapsed());
        }

        loop {
            self.apply_skip_propagation().await;

            if !fail_fast {
                let ready = self.graph.ready_phases(&self.context);
                for phase_id in ready {
                    if deferred.contains(&phase_id) {
                        continue;
                    }
                    if let Some(cap) = self.deps.parallelism_cap {
                        if in_flight >= cap {
                            deferred.push_back(phase_id);
                            continue;
                        }
                    }
                    self.try_launch(&phase_id, &mut deferred, &mut in_flight, tx.clone()).await;
                }

                let pending_deferred: Vec<PhaseId> = deferred.drain(..).collect();
                for phase_id in pending_deferred {
                    if let Some(cap) = self.deps.parallelism_cap {
                        if in_flight >= cap {
                            deferred.push_back(phase_id);
                            continue;
                        }
                    }
                    self.try_launch(&phase_id, &mut deferred, &mut in_flight, tx.clone()).await;
                }
            }

            if in_flight == 0 {
                if self.context.all_terminal() {
                    break;
                }
                if fail_fast {
                    // In-flight phases have all drained; sweep the rest.
                    self.skip_all_pending().await;
                    break;
                }
                if !deferred.is_empty() {
                    tokio::time::sleep(BREAKER_POLL_INTERVAL).await;
                    continue;
                }
                // Nothing ready, nothing deferred, nothing in flight, but not
                // terminal: the registry validated cleanly so this should be
                // unreachable; treat it as done rather than spin forever.
                warn!("scheduler idle with non-terminal phases remaining; stopping");
                break;
            }

            match rx.recv().await {
                Some(completion) => {
                    in_flight -= 1;
                    let triggers_fail_fast = self.handle_completion(completion).await;
                    if triggers_fail_fast && !fail_fast {
                        fail_fast = true;
                        self.cancel.cancel();
                        info!("critical phase failed; cancelling in-flight phases");
                    }
                }
                None => break,
            }
        }

        self.persist_checkpoint().await;
        let outcome = if self.context.phase_status.values().any(|status| {
            *status == PhaseStatus::Failed
        }) && fail_fast
        {
            Outcome::Failure
        } else {
            Outcome::Success
        };
        self.build_report(outcome, start.elapsed())
    }

    async fn try_launch(
        &mut self,
        phase_id: &PhaseId,
        deferred: &mut VecDeque<PhaseId>,
        in_flight: &mut usize,
        tx: mpsc::Sender<PhaseCompletion>,
    ) {
        let spec = self.graph.spec(phase_id).expect("ready phase must be registered").clone();

        match self.deps.breakers.check(&spec.adapter).await {
            Admission::Defer => {
                deferred.push_back(phase_id.clone());
                debug!(phase = %phase_id, adapter = %spec.adapter, "deferred: breaker open");
            }
            Admission::Admit => {
                self.context.set_status(phase_id, PhaseStatus::Running);
                self.persist_checkpoint().await;
                *in_flight += 1;

                let input = self.snapshot_inputs(&spec);
                // `Orchestrator::new` validates every registry adapter id against
                // this map eagerly, so a missing entry here would mean the
                // scheduler was constructed some other way without that check.
                let adapter = self
                    .deps
                    .adapters
                    .get(&spec.adapter)
                    .expect("adapter map was not validated against the registry before scheduling")
                    .clone();
                let breakers = self.deps.breakers.clone();
                let jitter = self.deps.jitter.clone();
                let workflow_id = self.context.workflow_id.clone();
                let cancel = self.cancel.clone();

                tokio::spawn(async move {
                    let completion = execute_phase(workflow_id, spec, adapter, input, breakers, jitter.as_ref(), cancel).await;
                    let _ = tx.send(completion).await;
                });
            }
        }
    }

    fn snapshot_inputs(&self, spec: &PhaseSpec) -> BTreeMap<String, serde_json::Value> {
        let mut snapshot = BTreeMap::new();
        for dep in &spec.requires {
            let Some(dep_spec) = self.graph.spec(dep) else {
                continue;
            };
            for key in &dep_spec.produces {
                if let Some(value) = self.context.outputs.get(key) {
                    snapshot.insert(key.clone(), value.clone());
                }
            }
        }
        snapshot
    }

    /// Returns `true` if this completion should trigger a fail-fast teardown.
    async fn handle_completion(&mut self, completion: PhaseCompletion) -> bool {
        let PhaseCompletion {
            phase_id,
            outcome,
            attempts,
            started_at,
            ended_at,
            cost_entries,
        } = completion;

        self.context.attempts.insert(phase_id.clone(), attempts);
        self.context.timings.insert(
            phase_id.clone(),
            PhaseTiming {
                start: started_at,
                end: Some(ended_at),
            },
        );
        for entry in cost_entries {
            if let Err(err) = self.deps.ledger_sink.append(&entry).await {
                warn!(error = %err, "failed to append ledger entry to sink");
            }
            self.context.ledger.push(entry);
        }

        let spec = self.graph.spec(&phase_id).expect("completed phase must be registered").clone();

        let mut fail_fast = false;
        match outcome {
            PhaseOutcome::Succeeded { outputs } => {
                for (key, value) in outputs {
                    if spec.produces.contains(&key) {
                        self.context.outputs.insert(key, value);
                    }
                }
                self.context.set_status(&phase_id, PhaseStatus::Succeeded);
                info!(phase = %phase_id, attempts, "phase succeeded");
            }
            PhaseOutcome::Failed { error, is_abort } => {
                self.context.errors.insert(phase_id.clone(), error);
                self.context.set_status(&phase_id, PhaseStatus::Failed);
                warn!(phase = %phase_id, attempts, "phase failed");
                if is_abort || spec.criticality == Criticality::Critical {
                    fail_fast = true;
                }
            }
        }

        self.persist_checkpoint().await;
        fail_fast
    }

    async fn apply_skip_propagation(&mut self) {
        loop {
            let to_skip = self.graph.propagate_skips(&self.context);
            if to_skip.is_empty() {
                break;
            }
            for phase_id in to_skip {
                self.context.set_status(&phase_id, PhaseStatus::Skipped);
            }
            self.persist_checkpoint().await;
        }
    }

    async fn skip_all_pending(&mut self) {
        let pending: Vec<PhaseId> = self
            .context
            .phase_status
            .iter()
            .filter(|(_, status)| **status == PhaseStatus::Pending)
            .map(|(id, _)| id.clone())
            .collect();
        for phase_id in pending {
            self.context.set_status(&phase_id, PhaseStatus::Skipped);
        }
        self.persist_checkpoint().await;
    }

    async fn persist_checkpoint(&self) {
        let checkpoint = self.context.to_checkpoint();
        if let Err(err) = self.deps.checkpoint_store.save(&checkpoint).await {
            warn!(error = %err, "failed to persist checkpoint");
        }
    }

    fn build_report(&self, outcome: Outcome, total_duration: Duration) -> Report {
        let phase_reports = self
            .context
            .phase_status
            .iter()
            .map(|(id, status)| PhaseReport {
                phase_id: id.clone(),
                status: *status,
                attempts: self.context.attempts.get(id).copied().unwrap_or(0),
                last_error: self.context.errors.get(id).cloned(),
                cost: self.context.ledger.iter().filter(|e| &e.phase_id == &id.0).map(|e| e.cost_amount).sum(),
            })
            .collect();

        Report {
            workflow_id: self.context.workflow_id.clone(),
            outcome,
            total_duration,
            phase_reports,
            ledger_summary: LedgerSummary::from_entries(&self.context.ledger),
        }
    }

    /// Exposes the current checkpoint, e.g. right after construction from a
    /// resumed context, for callers that need it without running anything.
    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }
}

enum AttemptResult {
    Completed(AdapterOutcome),
    TimedOut,
    Cancelled,
}

/// Runs one phase to a terminal outcome, including its internal retry loop
/// (§4.3). The breaker is checked for admission before the scheduler ever
/// calls this; each individual attempt still reports success/failure back
/// into the breaker so consecutive-failure counting reflects reality.
async fn execute_phase(
    workflow_id: crate::domain::models::workflow::WorkflowId,
    spec: PhaseSpec,
    adapter: Arc<dyn Adapter>,
    input: BTreeMap<String, serde_json::Value>,
    breakers: Arc<CircuitBreakerTable>,
    jitter: &dyn JitterSource,
    cancel: CancellationToken,
) -> PhaseCompletion {
    let started_at = Utc::now();
    let mut attempts: u32 = 0;
    let mut cost_entries = Vec::new();

    loop {
        attempts += 1;
        let attempt_start = Utc::now();

        if cancel.is_cancelled() {
            let ended_at = Utc::now();
            return PhaseCompletion {
                phase_id: spec.id,
                outcome: PhaseOutcome::Failed {
                    error: ErrorRecord::cancellation_timeout(),
                    is_abort: false,
                },
                attempts,
                started_at,
                ended_at,
                cost_entries,
            };
        }

        let invoke_fut = adapter.invoke(&input, cancel.clone(), spec.timeout);
        tokio::pin!(invoke_fut);

        let attempt_result = tokio::select! {
            result = tokio::time::timeout(spec.timeout, &mut invoke_fut) => {
                match result {
                    Ok(outcome) => AttemptResult::Completed(outcome),
                    Err(_) => AttemptResult::TimedOut,
                }
            }
            _ = cancel.cancelled() => {
                match tokio::time::timeout(CANCELLATION_GRACE, &mut invoke_fut).await {
                    Ok(outcome) => AttemptResult::Completed(outcome),
                    Err(_) => AttemptResult::Cancelled,
                }
            }
        };

        let attempt_end = Utc::now();

        let (outputs, cost, error) = match attempt_result {
            AttemptResult::Completed(adapter_outcome) => {
                (adapter_outcome.outputs, adapter_outcome.cost, adapter_outcome.error)
            }
            AttemptResult::TimedOut => {
                let kind = if spec.timeout_is_permanent {
                    ErrorKind::Permanent
                } else {
                    ErrorKind::Transient
                };
                (BTreeMap::new(), None, Some(ErrorRecord::new(kind, "phase timed out")))
            }
            AttemptResult::Cancelled => (BTreeMap::new(), None, Some(ErrorRecord::cancellation_timeout())),
        };

        match error {
            None => {
                if let Some(cost_entry_template) = cost {
                    cost_entries.push(CostEntry {
                        workflow_id: workflow_id.clone(),
                        phase_id: spec.id.0.clone(),
                        attempt: attempts,
                        started_at: attempt_start,
                        ended_at: attempt_end,
                        outcome: AttemptOutcome::Succeeded,
                        adapter: spec.adapter.clone(),
                        ..cost_entry_template
                    });
                }
                breakers.record_success(&spec.adapter).await;
                return PhaseCompletion {
                    phase_id: spec.id,
                    outcome: PhaseOutcome::Succeeded { outputs },
                    attempts,
                    started_at,
                    ended_at: attempt_end,
                    cost_entries,
                };
            }
            Some(error) => {
                breakers.record_failure(&spec.adapter).await;
                let decision = retry::decide(&spec.retry, error.kind, attempts, jitter);
                let outcome_tag = match decision {
                    RetryDecision::Retry { .. } => AttemptOutcome::Retrying,
                    RetryDecision::Exhausted | RetryDecision::Abort => AttemptOutcome::Failed,
                };

                // One ledger entry per attempt (§4.5), whether or not the
                // adapter attached a cost to this failed attempt.
                cost_entries.push(match cost {
                    Some(cost_entry_template) => CostEntry {
                        workflow_id: workflow_id.clone(),
                        phase_id: spec.id.0.clone(),
                        attempt: attempts,
                        started_at: attempt_start,
                        ended_at: attempt_end,
                        outcome: outcome_tag,
                        adapter: spec.adapter.clone(),
                        ..cost_entry_template
                    },
                    None => CostEntry {
                        workflow_id: workflow_id.clone(),
                        phase_id: spec.id.0.clone(),
                        attempt: attempts,
                        started_at: attempt_start,
                        ended_at: attempt_end,
                        outcome: outcome_tag,
                        adapter: spec.adapter.clone(),
                        cost_amount: 0.0,
                        cost_currency: None,
                        notes: Some(format!("attempt {attempts} failed: {error}")),
                    },
                });

                match decision {
                    RetryDecision::Retry { delay } => {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => {}
                        }
                        continue;
                    }
                    RetryDecision::Exhausted => {
                        return PhaseCompletion {
                            phase_id: spec.id,
                            outcome: PhaseOutcome::Failed { error, is_abort: false },
                            attempts,
                            started_at,
                            ended_at: attempt_end,
                            cost_entries,
                        };
                    }
                    RetryDecision::Abort => {
                        return PhaseCompletion {
                            phase_id: spec.id,
                            outcome: PhaseOutcome::Failed { error, is_abort: true },
                            attempts,
                            started_at,
                            ended_at: attempt_end,
                            cost_entries,
                        };
                    }
                }
            }
        }
    }
}

