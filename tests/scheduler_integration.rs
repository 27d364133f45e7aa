//! End-to-end scenarios exercising the full run/resume path: `Orchestrator`
//! over the `Standard` registry, plus one hand-built graph for the breaker
//! trip/half-open/recovery sequence that the registry can't express on its
//! own (§8 S1-S6).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use orchestrator_core::adapters::memory::InMemoryCheckpointStore;
use orchestrator_core::adapters::ledger::memory::InMemoryLedgerSink;
use orchestrator_core::adapters::stub::{ScriptedAttempt, StubAdapter};
use orchestrator_core::cli::demo_adapters;
use orchestrator_core::domain::errors::ErrorRecord;
use orchestrator_core::domain::models::circuit_breaker::{CircuitBreakerConfig, CircuitState};
use orchestrator_core::domain::models::config::Config;
use orchestrator_core::domain::models::phase::{AdapterId, Criticality, PhaseId, PhaseSpec, RetryPolicy};
use orchestrator_core::domain::models::report::Outcome;
use orchestrator_core::domain::models::workflow::{PhaseStatus, WorkflowContext, WorkflowId, WorkflowType};
use orchestrator_core::domain::ports::adapter::Adapter;
use orchestrator_core::domain::ports::checkpoint_store::CheckpointStore;
use orchestrator_core::services::circuit_breaker::CircuitBreakerTable;
use orchestrator_core::services::dependency_graph::DependencyGraph;
use orchestrator_core::services::scheduler::{Scheduler, SchedulerDeps};
use orchestrator_core::services::{registry, Orchestrator};

type AdapterMap = std::collections::HashMap<AdapterId, Arc<dyn Adapter>>;

fn overriding(mut base: AdapterMap, id: &str, adapter: Arc<dyn Adapter>) -> AdapterMap {
    base.insert(AdapterId::new(id), adapter);
    base
}

fn in_memory_orchestrator(config: Config, adapters: AdapterMap) -> (Orchestrator, Arc<InMemoryCheckpointStore>) {
    let store = Arc::new(InMemoryCheckpointStore::new());
    let sink = Arc::new(InMemoryLedgerSink::new());
    let orchestrator =
        Orchestrator::new(config, adapters, store.clone(), sink).expect("adapter map covers every registered phase");
    (orchestrator, store)
}

// ============================================================
// S1: Happy path, Standard — all 17 phases succeed immediately.
// ============================================================
#[tokio::test]
async fn happy_path_standard_all_phases_succeed() {
    let (orchestrator, store) = in_memory_orchestrator(Config::default(), demo_adapters());

    let report = orchestrator.run(WorkflowType::Standard).await.expect("run must not error");

    assert_eq!(report.outcome, Outcome::Success);
    assert_eq!(report.phase_reports.len(), 17, "Standard registers 17 phases");
    for phase in &report.phase_reports {
        assert_eq!(phase.status, PhaseStatus::Succeeded, "{} did not succeed", phase.phase_id);
        assert_eq!(phase.attempts, 1, "{} should need exactly one attempt", phase.phase_id);
    }
    // The demo stubs attach no cost to a first-attempt success, so a clean
    // run produces an empty ledger (P4: total is the sum of zero entries).
    assert!((report.ledger_summary.grand_total - 0.0).abs() < f64::EPSILON);
    assert_eq!(report.ledger_summary.entry_count, 0);

    let checkpoint = store
        .load(&report.workflow_id)
        .await
        .unwrap()
        .expect("a checkpoint must exist after a completed run");
    assert!(checkpoint.phase_status.values().all(|s| *s == PhaseStatus::Succeeded));
}

// ============================================================
// S2: Transient recovery — generate_images fails twice, succeeds on the
// third attempt; breaker stays Closed (2 consecutive failures < threshold 5).
// ============================================================
#[tokio::test]
async fn transient_failure_recovers_within_max_attempts() {
    let mut config = Config::default();
    config.retry.max_attempts = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter_fraction = 0.0;

    let flaky = StubAdapter::new(
        "image.generate",
        vec![
            ScriptedAttempt::Fail(ErrorRecord::transient("provider overloaded")),
            ScriptedAttempt::Fail(ErrorRecord::transient("provider overloaded")),
            ScriptedAttempt::Succeed { outputs: BTreeMap::new(), cost: 0.0 },
        ],
    );
    let adapters = overriding(demo_adapters(), "image.generate", Arc::new(flaky));

    let (orchestrator, _store) = in_memory_orchestrator(config, adapters);
    let report = orchestrator.run(WorkflowType::Standard).await.expect("run must not error");

    assert_eq!(report.outcome, Outcome::Success);
    let images = report
        .phase_reports
        .iter()
        .find(|p| p.phase_id == PhaseId::new("generate_images"))
        .expect("generate_images must be reported");
    assert_eq!(images.status, PhaseStatus::Succeeded);
    assert_eq!(images.attempts, 3);

    let ledger_entries_for_phase = report.ledger_summary.by_phase.get("generate_images");
    assert!(ledger_entries_for_phase.is_some(), "retries must still land in the ledger");
}

// ============================================================
// S3: Breaker trip, defer, half-open recovery. Built on a small hand-rolled
// graph rather than the registry: `trip1`/`trip2` share an adapter and fail
// immediately, tripping the breaker (threshold=2); `probe` shares the same
// adapter but is gated behind a `gate` phase on a different adapter with a
// scripted delay, so its readiness — and therefore its breaker admission
// check — lands strictly after the trip, while the cooldown (50ms) is still
// running.
// ============================================================
#[tokio::test]
async fn breaker_trips_defers_and_recovers_via_half_open() {
    let retry_once = RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1), 0.0);
    let generous_timeout = Duration::from_secs(5);

    let mut specs = BTreeMap::new();
    for (id, group) in [("trip1", "default"), ("trip2", "default")] {
        specs.insert(
            PhaseId::new(id),
            PhaseSpec::new(id, [], [], group, "breaker.x", retry_once, generous_timeout, Criticality::BestEffort),
        );
    }
    specs.insert(
        PhaseId::new("gate"),
        PhaseSpec::new("gate", [], [], "gate", "gate.noop", retry_once, generous_timeout, Criticality::BestEffort),
    );
    specs.insert(
        PhaseId::new("probe"),
        PhaseSpec::new(
            "probe",
            ["gate"],
            [],
            "default",
            "breaker.x",
            retry_once,
            generous_timeout,
            Criticality::BestEffort,
        ),
    );

    let graph = DependencyGraph::build(specs).expect("hand-built graph must validate");
    let context = WorkflowContext::new(WorkflowId::new("s3-breaker-trip"), WorkflowType::Standard, graph.all_ids().cloned());

    let breaker_x = StubAdapter::new(
        "breaker.x",
        vec![
            ScriptedAttempt::Fail(ErrorRecord::transient("trip1 down")),
            ScriptedAttempt::Fail(ErrorRecord::transient("trip2 down")),
            ScriptedAttempt::Succeed { outputs: BTreeMap::new(), cost: 0.0 },
        ],
    );
    let gate_noop = StubAdapter::new("gate.noop", vec![ScriptedAttempt::Delay(Duration::from_millis(20))]);

    let mut adapters: AdapterMap = std::collections::HashMap::new();
    adapters.insert(AdapterId::new("breaker.x"), Arc::new(breaker_x));
    adapters.insert(AdapterId::new("gate.noop"), Arc::new(gate_noop));

    let breakers = Arc::new(CircuitBreakerTable::new(CircuitBreakerConfig {
        threshold: 2,
        cooldown: chrono::Duration::milliseconds(50),
    }));
    let checkpoint_store = Arc::new(InMemoryCheckpointStore::new());
    let ledger_sink = Arc::new(InMemoryLedgerSink::new());

    let deps = SchedulerDeps::new(adapters, breakers.clone(), checkpoint_store, ledger_sink, None);
    let scheduler = Scheduler::new(graph, context, deps);

    let report = scheduler.run_to_completion().await;

    assert_eq!(report.outcome, Outcome::Success, "BestEffort failures must not fail the run");
    assert!(
        report.total_duration >= Duration::from_millis(40),
        "the probe must have waited out most of the cooldown, took {:?}",
        report.total_duration
    );

    let status_of = |id: &str| {
        report
            .phase_reports
            .iter()
            .find(|p| p.phase_id == PhaseId::new(id))
            .unwrap_or_else(|| panic!("{id} must be reported"))
            .status
    };
    assert_eq!(status_of("trip1"), PhaseStatus::Failed);
    assert_eq!(status_of("trip2"), PhaseStatus::Failed);
    assert_eq!(status_of("gate"), PhaseStatus::Succeeded);
    assert_eq!(status_of("probe"), PhaseStatus::Succeeded, "the half-open probe must have succeeded");

    assert_eq!(breakers.state_of(&AdapterId::new("breaker.x")).await, CircuitState::Closed);
}

// ============================================================
// S4: Critical permanent failure — fetch_item fails Permanent on attempt 1;
// the whole run aborts, every downstream phase is Skipped, no publish ever
// runs.
// ============================================================
#[tokio::test]
async fn critical_permanent_failure_skips_everything_downstream() {
    let broken_fetch = StubAdapter::always_fails("record_store.fetch_pending", ErrorRecord::permanent("record not found"));
    let adapters = overriding(demo_adapters(), "record_store.fetch_pending", Arc::new(broken_fetch));

    let (orchestrator, _store) = in_memory_orchestrator(Config::default(), adapters);
    let report = orchestrator.run(WorkflowType::Standard).await.expect("run must not error");

    assert_eq!(report.outcome, Outcome::Failure);

    let status_of = |id: &str| {
        report
            .phase_reports
            .iter()
            .find(|p| p.phase_id == PhaseId::new(id))
            .unwrap_or_else(|| panic!("{id} must be reported"))
            .status
    };
    assert_eq!(status_of("fetch_item"), PhaseStatus::Failed);
    for downstream in [
        "scrape_source",
        "extract_category",
        "validate_products",
        "persist_products",
        "generate_images",
        "render_video",
        "publish_a",
        "publish_b",
        "publish_c",
        "update_status",
        "finalize",
    ] {
        assert_eq!(status_of(downstream), PhaseStatus::Skipped, "{downstream} must be skipped");
    }

    assert!(report.ledger_summary.by_phase.get("publish_a").is_none(), "no publish attempt should ever run");
    assert!(report.ledger_summary.by_phase.get("publish_b").is_none());
    assert!(report.ledger_summary.by_phase.get("publish_c").is_none());

    let fetch_report = report.phase_reports.iter().find(|p| p.phase_id == PhaseId::new("fetch_item")).unwrap();
    let error = fetch_report.last_error.as_ref().expect("the original error must be retained");
    assert_eq!(error.message, "record not found");
}

// ============================================================
// S5: BestEffort failure with propagation — publish_b fails Permanent;
// publish_a and publish_c still succeed; update_status only requires
// publish_a so it and finalize still complete the run successfully.
// ============================================================
#[tokio::test]
async fn best_effort_publish_failure_does_not_fail_the_run() {
    let broken_publish_b = StubAdapter::always_fails("publisher.publish_b", ErrorRecord::permanent("endpoint rejected payload"));
    let adapters = overriding(demo_adapters(), "publisher.publish_b", Arc::new(broken_publish_b));

    let (orchestrator, _store) = in_memory_orchestrator(Config::default(), adapters);
    let report = orchestrator.run(WorkflowType::Standard).await.expect("run must not error");

    assert_eq!(report.outcome, Outcome::Success);

    let status_of = |id: &str| {
        report
            .phase_reports
            .iter()
            .find(|p| p.phase_id == PhaseId::new(id))
            .unwrap_or_else(|| panic!("{id} must be reported"))
            .status
    };
    assert_eq!(status_of("publish_a"), PhaseStatus::Succeeded);
    assert_eq!(status_of("publish_b"), PhaseStatus::Failed);
    assert_eq!(status_of("publish_c"), PhaseStatus::Succeeded);
    assert_eq!(status_of("update_status"), PhaseStatus::Succeeded);
    assert_eq!(status_of("finalize"), PhaseStatus::Succeeded);

    let non_fatal = report.non_fatal_failures();
    assert!(non_fatal.iter().any(|p| p.phase_id == PhaseId::new("publish_b")), "publish_b must be flagged as a non-fatal failure");
}

// ============================================================
// S6: Resume after crash. A checkpoint is seeded as if the process died
// right after `generate_voices` succeeded and before `render_video` began;
// `resume` must not re-invoke any adapter bound to an already-`Succeeded`
// phase (enforced here by wiring those adapters to fail hard if called) and
// must still drive the remaining phases to completion.
// ============================================================
#[tokio::test]
async fn resume_continues_from_checkpoint_without_rerunning_succeeded_phases() {
    let config = Config::default();
    let graph = registry::build_graph(WorkflowType::Standard, &config).expect("standard registry must validate");

    let already_succeeded = [
        "validate_credentials",
        "fetch_item",
        "scrape_source",
        "extract_category",
        "validate_products",
        "persist_products",
        "generate_images",
        "generate_text_content",
        "generate_scripts",
        "generate_voices",
    ];

    let workflow_id = WorkflowId::new("s6-resume");
    let mut context = WorkflowContext::new(workflow_id.clone(), WorkflowType::Standard, graph.all_ids().cloned());
    for id in already_succeeded {
        let phase_id = PhaseId::new(id);
        context.set_status(&phase_id, PhaseStatus::Running);
        context.set_status(&phase_id, PhaseStatus::Succeeded);
        context.attempts.insert(phase_id.clone(), 1);
        if let Some(spec) = graph.spec(&phase_id) {
            for key in &spec.produces {
                context.outputs.insert(key.clone(), serde_json::json!("precrash-value"));
            }
        }
    }

    let store = Arc::new(InMemoryCheckpointStore::new());
    store.save(&context.to_checkpoint()).await.unwrap();

    // Adapters for phases already Succeeded must never be called again; wire
    // them to fail loudly so an accidental re-invocation surfaces as a test
    // failure instead of silently double-billing an external provider.
    let adapters = demo_adapters_poisoned_for_resume();
    let orchestrator = Orchestrator::new(config, adapters, store.clone(), Arc::new(InMemoryLedgerSink::new()))
        .expect("poisoned adapter map still covers every registered phase");

    let report = orchestrator.resume(&workflow_id).await.expect("resume must not error");

    assert_eq!(report.outcome, Outcome::Success);

    let status_of = |id: &str| {
        report
            .phase_reports
            .iter()
            .find(|p| p.phase_id == PhaseId::new(id))
            .unwrap_or_else(|| panic!("{id} must be reported"))
            .status
    };
    for id in already_succeeded {
        assert_eq!(status_of(id), PhaseStatus::Succeeded);
    }
    for id in ["validate_media", "render_video", "publish_a", "publish_b", "publish_c", "update_status", "finalize"] {
        assert_eq!(status_of(id), PhaseStatus::Succeeded, "{id} must complete after resume");
    }

    let precrash_attempts = report
        .phase_reports
        .iter()
        .find(|p| p.phase_id == PhaseId::new("generate_voices"))
        .unwrap()
        .attempts;
    assert_eq!(precrash_attempts, 1, "attempts recorded before the crash must be preserved, not re-incremented");
}

fn demo_adapters_poisoned_for_resume() -> AdapterMap {
    let mut adapters = demo_adapters();
    for poisoned in [
        "credentials.check",
        "record_store.fetch_pending",
        "source.scrape",
        "category.extract",
        "validation.products",
        "image.generate",
        "text.generate",
        "voice.synthesize",
    ] {
        adapters.insert(
            AdapterId::new(poisoned),
            Arc::new(StubAdapter::always_fails(poisoned, ErrorRecord::abort("must not be called after resume"))),
        );
    }
    adapters
}
