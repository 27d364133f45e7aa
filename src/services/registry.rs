//! Static phase registry: one catalogue per [`WorkflowType`] (§4.4).
//!
//! Workflow variants differ only in which phases are registered; the
//! scheduler itself is unchanged (§4.4, §9 "collapsed into a flat phase
//! list").

use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::config::Config;
use crate::domain::models::phase::{Criticality, PhaseId, PhaseSpec, RetryPolicy};
use crate::domain::models::workflow::WorkflowType;
use crate::services::dependency_graph::DependencyGraph;

fn retry_from(config: &Config) -> RetryPolicy {
    RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.base_delay_ms),
        Duration::from_millis(config.retry.max_delay_ms),
        config.retry.jitter_fraction,
    )
}

/// The 17-phase `Standard` registry (§3 example set, §8 S1).
fn standard_specs(config: &Config) -> BTreeMap<PhaseId, PhaseSpec> {
    let retry = retry_from(config);
    let timeout = Duration::from_secs(30);

    let mut specs = BTreeMap::new();
    let mut insert = |spec: PhaseSpec| {
        specs.insert(spec.id.clone(), spec);
    };

    insert(PhaseSpec::new(
        "validate_credentials",
        [],
        [],
        "preflight",
        "credentials.check",
        retry,
        Duration::from_secs(10),
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "fetch_item",
        ["validate_credentials"],
        ["pending_item"],
        "default",
        "record_store.fetch_pending",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "scrape_source",
        ["fetch_item"],
        ["scraped_items"],
        "default",
        "source.scrape",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "extract_category",
        ["scrape_source"],
        ["category"],
        "default",
        "category.extract",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "validate_products",
        ["scrape_source", "extract_category"],
        ["validated_items"],
        "default",
        "validation.products",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "persist_products",
        ["validate_products"],
        ["persisted_ids"],
        "default",
        "record_store.patch",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "generate_images",
        ["validate_products"],
        ["images"],
        "generation",
        "image.generate",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "generate_text_content",
        ["validate_products"],
        ["text_payloads"],
        "generation",
        "text.generate",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "generate_scripts",
        ["generate_text_content"],
        ["scripts"],
        "generation",
        "text.generate",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "generate_voices",
        ["generate_scripts"],
        ["voices"],
        "generation",
        "voice.synthesize",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "validate_media",
        ["generate_images", "generate_voices"],
        ["media_validated"],
        "default",
        "validation.media",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "render_video",
        ["validate_media", "generate_scripts"],
        ["video_handle"],
        "default",
        "video.render",
        retry,
        Duration::from_secs(300),
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "publish_a",
        ["render_video"],
        ["published_a"],
        "publishing",
        "publisher.publish_a",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "publish_b",
        ["render_video"],
        ["published_b"],
        "publishing",
        "publisher.publish_b",
        retry,
        timeout,
        Criticality::BestEffort,
    ));
    insert(PhaseSpec::new(
        "publish_c",
        ["render_video"],
        ["published_c"],
        "publishing",
        "publisher.publish_c",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "update_status",
        ["publish_a"],
        [],
        "default",
        "record_store.patch",
        retry,
        timeout,
        Criticality::Critical,
    ));
    insert(PhaseSpec::new(
        "finalize",
        ["update_status"],
        ["final_status"],
        "default",
        "record_store.patch",
        retry,
        timeout,
        Criticality::Critical,
    ));

    specs
}

/// `Enhanced` adds `apply_effects` and swaps the `render_video` adapter
/// (§4.4: "adds one phase ... and swaps the adapter for `render_video`").
fn enhanced_specs(config: &Config) -> BTreeMap<PhaseId, PhaseSpec> {
    let retry = retry_from(config);
    let timeout = Duration::from_secs(30);

    let mut specs = standard_specs(config);

    specs.insert(
        PhaseId::new("apply_effects"),
        PhaseSpec::new(
            "apply_effects",
            ["validate_media"],
            ["effects_plan"],
            "default",
            "effects.plan",
            retry,
            timeout,
            Criticality::Critical,
        ),
    );

    let render = specs.get_mut(&PhaseId::new("render_video")).expect("render_video is always registered");
    render.requires.insert(PhaseId::new("apply_effects"));
    render.adapter = crate::domain::models::phase::AdapterId::new("video.render.enhanced");
    render.timeout = Duration::from_secs(600);

    specs
}

/// Builds and validates the graph for a workflow type (§4.1 step 1, §4.4).
pub fn build_graph(workflow_type: WorkflowType, config: &Config) -> OrchestratorResult<DependencyGraph> {
    let specs = match workflow_type {
        WorkflowType::Standard => standard_specs(config),
        WorkflowType::Enhanced => enhanced_specs(config),
    };
    DependencyGraph::build(specs)
}
