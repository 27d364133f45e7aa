//! Thin CLI surface: `run`, `resume`, `report` (§6).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use serde_json::Value;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::config::Config;
use crate::domain::models::phase::AdapterId;
use crate::domain::models::report::{Outcome, Report};
use crate::domain::models::workflow::{Checkpoint, PhaseStatus, WorkflowId, WorkflowType};
use crate::domain::ports::adapter::Adapter;
use crate::domain::ports::checkpoint_store::CheckpointStore;
use crate::domain::ports::ledger_sink::LedgerSink;
use crate::services::orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "orchestrator", about = "Phase-scheduling pipeline orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a fresh run of the named workflow type.
    Run {
        #[arg(long = "type", default_value = "standard")]
        workflow_type: WorkflowType,
    },
    /// Resume a previously checkpointed workflow.
    Resume {
        #[arg(long = "id")]
        workflow_id: String,
    },
    /// Print the last known checkpoint state for a workflow.
    Report {
        #[arg(long = "id")]
        workflow_id: String,
    },
}

/// Exit codes per the CLI contract: `0` success, `1` generic failure,
/// `2` a `Critical` phase failed, `3` a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GenericFailure = 1,
    CriticalPhaseFailure = 2,
    ConfigurationError = 3,
}

pub struct Runtime {
    pub config: Config,
    pub checkpoint_store: Arc<dyn CheckpointStore>,
    pub ledger_sink: Arc<dyn LedgerSink>,
    pub adapters: HashMap<AdapterId, Arc<dyn Adapter>>,
}

impl Runtime {
    /// Dispatches a parsed [`Command`], rendering whatever it produces and
    /// mapping the outcome to a CLI exit code (§6). Failures are attached
    /// human-readable context on the way up so the printed chain explains
    /// *what step* failed, not just the raw adapter/database error.
    pub async fn dispatch(&self, command: Command) -> ExitCode {
        match self.try_dispatch(command).await {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err:?}");
                if err.downcast_ref::<OrchestratorError>().is_some_and(is_configuration_error) {
                    ExitCode::ConfigurationError
                } else {
                    ExitCode::GenericFailure
                }
            }
        }
    }

    async fn try_dispatch(&self, command: Command) -> Result<ExitCode> {
        let orchestrator = Orchestrator::new(
            self.config.clone(),
            self.adapters.clone(),
            self.checkpoint_store.clone(),
            self.ledger_sink.clone(),
        )
        .context("failed to wire orchestrator from the configured adapter map")?;

        let report = match command {
            Command::Run { workflow_type } => {
                orchestrator.run(workflow_type).await.with_context(|| format!("run of workflow type '{workflow_type}' failed"))?
            }
            Command::Resume { workflow_id } => {
                let workflow_id = WorkflowId::new(workflow_id);
                orchestrator
                    .resume(&workflow_id)
                    .await
                    .with_context(|| format!("resume of workflow '{workflow_id}' failed"))?
            }
            Command::Report { workflow_id } => return self.report(&WorkflowId::new(workflow_id)).await,
        };

        print_report(&report);
        Ok(match report.outcome {
            Outcome::Success => ExitCode::Success,
            Outcome::Failure => {
                if report.phase_reports.iter().any(|p| p.status == PhaseStatus::Failed) {
                    ExitCode::CriticalPhaseFailure
                } else {
                    ExitCode::GenericFailure
                }
            }
        })
    }

    async fn report(&self, workflow_id: &WorkflowId) -> Result<ExitCode> {
        let checkpoint = self
            .checkpoint_store
            .load(workflow_id)
            .await
            .with_context(|| format!("failed to load checkpoint for workflow '{workflow_id}'"))?;

        match checkpoint {
            Some(checkpoint) => {
                print_checkpoint(&checkpoint);
                Ok(ExitCode::Success)
            }
            None => {
                eprintln!("no checkpoint found for workflow {workflow_id}");
                Ok(ExitCode::GenericFailure)
            }
        }
    }
}

/// Configuration-shaped failures (registry validation, an incomplete adapter
/// map) map to [`ExitCode::ConfigurationError`]; everything else is a
/// generic run failure.
fn is_configuration_error(err: &OrchestratorError) -> bool {
    matches!(
        err,
        OrchestratorError::CyclicGraph(_)
            | OrchestratorError::UnknownRequirement(_, _)
            | OrchestratorError::UnsatisfiableGroup { .. }
            | OrchestratorError::AdapterNotRegistered(_)
    )
}

fn base_table() -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL).set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_report(report: &Report) {
    println!("workflow {}: {:?} in {:?}", report.workflow_id, report.outcome, report.total_duration);

    let mut table = base_table();
    table.set_header(vec![
        Cell::new("Phase").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Attempts").add_attribute(Attribute::Bold),
        Cell::new("Cost").add_attribute(Attribute::Bold),
    ]);
    for phase in &report.phase_reports {
        table.add_row(vec![
            Cell::new(phase.phase_id.to_string()),
            Cell::new(phase.status.to_string()),
            Cell::new(phase.attempts.to_string()),
            Cell::new(format!("{:.4}", phase.cost)),
        ]);
    }
    println!("{table}");

    println!("total cost: {:.4}", report.ledger_summary.grand_total);
    for failure in report.non_fatal_failures() {
        println!("  non-fatal: {} ({})", failure.phase_id, failure.status);
    }
}

fn print_checkpoint(checkpoint: &Checkpoint) {
    println!("workflow {}: {} phases", checkpoint.workflow_id, checkpoint.phase_status.len());

    let mut table = base_table();
    table.set_header(vec![Cell::new("Phase").add_attribute(Attribute::Bold), Cell::new("Status").add_attribute(Attribute::Bold)]);
    for (phase_id, status) in &checkpoint.phase_status {
        table.add_row(vec![Cell::new(phase_id.to_string()), Cell::new(status.to_string())]);
    }
    println!("{table}");
}

/// Wires every adapter id referenced by the standard and enhanced registries
/// to a deterministic [`crate::adapters::stub::StubAdapter`]. Real capability
/// adapters (scraping, generation, publishing, ...) are out of scope for this
/// crate and are expected to be supplied by the embedding application.
pub fn demo_adapters() -> HashMap<AdapterId, Arc<dyn Adapter>> {
    let names = [
        "credentials.check",
        "record_store.fetch_pending",
        "source.scrape",
        "category.extract",
        "validation.products",
        "record_store.patch",
        "image.generate",
        "text.generate",
        "voice.synthesize",
        "validation.media",
        "video.render",
        "video.render.enhanced",
        "publisher.publish_a",
        "publisher.publish_b",
        "publisher.publish_c",
        "effects.plan",
    ];

    names
        .into_iter()
        .map(|name| {
            let adapter: Arc<dyn Adapter> =
                Arc::new(crate::adapters::stub::StubAdapter::always_succeeds(name, BTreeMap::<String, Value>::new()));
            (AdapterId::new(name), adapter)
        })
        .collect()
}
