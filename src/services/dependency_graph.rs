//! Dependency graph derived from the phase registry (§4.4, §2).

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::phase::{PhaseId, PhaseSpec};
use crate::domain::models::workflow::{PhaseStatus, WorkflowContext};

/// Validated, acyclic view over a set of [`PhaseSpec`]s.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    specs: BTreeMap<PhaseId, PhaseSpec>,
    /// phase -> phases that depend on it, derived from `requires`.
    successors: HashMap<PhaseId, Vec<PhaseId>>,
}

impl DependencyGraph {
    /// Validates the registry per §4.4 and builds the derived successor index.
    pub fn build(specs: BTreeMap<PhaseId, PhaseSpec>) -> OrchestratorResult<Self> {
        validate_requirements(&specs)?;
        validate_unique_producers(&specs)?;
        validate_group_invariants(&specs)?;
        validate_acyclic(&specs)?;

        let mut successors: HashMap<PhaseId, Vec<PhaseId>> = HashMap::new();
        for spec in specs.values() {
            for dep in &spec.requires {
                successors.entry(dep.clone()).or_default().push(spec.id.clone());
            }
        }

        Ok(Self { specs, successors })
    }

    pub fn spec(&self, id: &PhaseId) -> Option<&PhaseSpec> {
        self.specs.get(id)
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &PhaseId> {
        self.specs.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Topological layers (phases with no unresolved predecessors come
    /// first), used for the initial ready set and for resume.
    pub fn topological_layers(&self) -> Vec<Vec<PhaseId>> {
        let mut in_degree: HashMap<PhaseId, usize> =
            self.specs.keys().map(|id| (id.clone(), self.specs[id].requires.len())).collect();
        let mut layers = Vec::new();
        let mut frontier: Vec<PhaseId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| id.clone())
            .collect();
        frontier.sort();

        let mut remaining = in_degree.len();
        while !frontier.is_empty() {
            remaining -= frontier.len();
            let mut next_frontier = Vec::new();
            for id in &frontier {
                if let Some(succs) = self.successors.get(id) {
                    for succ in succs {
                        let deg = in_degree.get_mut(succ).expect("successor must be registered");
                        *deg -= 1;
                        if *deg == 0 {
                            next_frontier.push(succ.clone());
                        }
                    }
                }
            }
            next_frontier.sort();
            layers.push(std::mem::replace(&mut frontier, next_frontier));
        }
        debug_assert_eq!(remaining, 0, "validate_acyclic should have rejected this graph");
        layers
    }

    /// Phases whose predecessors are all `Succeeded` (or `Skipped` with the
    /// missing key declared acceptable) and which are themselves still
    /// `Pending` (§4.1 step 2/3e, §4.9).
    pub fn ready_phases(&self, context: &WorkflowContext) -> Vec<PhaseId> {
        let mut ready: Vec<PhaseId> = self
            .specs
            .values()
            .filter(|spec| context.status_of(&spec.id) == PhaseStatus::Pending)
            .filter(|spec| self.predecessors_satisfied(spec, context))
            .map(|spec| spec.id.clone())
            .collect();
        ready.sort();
        ready
    }

    fn predecessors_satisfied(&self, spec: &PhaseSpec, context: &WorkflowContext) -> bool {
        spec.requires.iter().all(|dep| match context.status_of(dep) {
            PhaseStatus::Succeeded => true,
            PhaseStatus::Skipped => {
                let Some(dep_spec) = self.specs.get(dep) else {
                    return false;
                };
                dep_spec.produces.iter().all(|key| spec.accepts_missing.contains(key))
            }
            _ => false,
        })
    }

    /// Phases that should be marked `Skipped` because a predecessor they
    /// cannot tolerate missing just became terminally unavailable (§4.9
    /// propagation). Only considers phases still `Pending`.
    pub fn propagate_skips(&self, context: &WorkflowContext) -> Vec<PhaseId> {
        let mut skip = Vec::new();
        for spec in self.specs.values() {
            if context.status_of(&spec.id) != PhaseStatus::Pending {
                continue;
            }
            let blocked = spec.requires.iter().any(|dep| {
                let dep_status = context.status_of(dep);
                if dep_status == PhaseStatus::Failed {
                    return true;
                }
                if dep_status == PhaseStatus::Skipped {
                    let Some(dep_spec) = self.specs.get(dep) else {
                        return true;
                    };
                    return !dep_spec.produces.iter().all(|key| spec.accepts_missing.contains(key));
                }
                false
            });
            if blocked {
                skip.push(spec.id.clone());
            }
        }
        skip
    }
}

fn validate_requirements(specs: &BTreeMap<PhaseId, PhaseSpec>) -> OrchestratorResult<()> {
    for spec in specs.values() {
        for dep in &spec.requires {
            if !specs.contains_key(dep) {
                return Err(OrchestratorError::UnknownRequirement(spec.id.clone(), dep.clone()));
            }
        }
    }
    Ok(())
}

fn validate_unique_producers(specs: &BTreeMap<PhaseId, PhaseSpec>) -> OrchestratorResult<()> {
    let mut producer_of: HashMap<String, PhaseId> = HashMap::new();
    for spec in specs.values() {
        for key in &spec.produces {
            if let Some(existing) = producer_of.get(key) {
                return Err(OrchestratorError::DuplicateProducer {
                    key: key.clone(),
                    first: existing.clone(),
                    second: spec.id.clone(),
                });
            }
            producer_of.insert(key.clone(), spec.id.clone());
        }
    }
    Ok(())
}

fn validate_group_invariants(specs: &BTreeMap<PhaseId, PhaseSpec>) -> OrchestratorResult<()> {
    let mut by_group: HashMap<&crate::domain::models::phase::ConcurrencyGroup, Vec<&PhaseSpec>> = HashMap::new();
    for spec in specs.values() {
        by_group.entry(&spec.group).or_default().push(spec);
    }
    for members in by_group.values() {
        let member_ids: BTreeSet<&PhaseId> = members.iter().map(|s| &s.id).collect();
        for spec in members {
            for dep in &spec.requires {
                if member_ids.contains(dep) {
                    return Err(OrchestratorError::UnsatisfiableGroup {
                        group: spec.group.0.clone(),
                        from: spec.id.clone(),
                        to: dep.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm; reports the first phase left in a cycle.
fn validate_acyclic(specs: &BTreeMap<PhaseId, PhaseSpec>) -> OrchestratorResult<()> {
    let mut in_degree: HashMap<PhaseId, usize> = specs.keys().map(|id| (id.clone(), specs[id].requires.len())).collect();
    let mut successors: HashMap<PhaseId, Vec<PhaseId>> = HashMap::new();
    for spec in specs.values() {
        for dep in &spec.requires {
            successors.entry(dep.clone()).or_default().push(spec.id.clone());
        }
    }

    let mut queue: VecDeque<PhaseId> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| id.clone())
        .collect();

    let mut visited = 0usize;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        if let Some(succs) = successors.get(&id) {
            for succ in succs {
                let deg = in_degree.get_mut(succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(succ.clone());
                }
            }
        }
    }

    if visited != specs.len() {
        let stuck = in_degree
            .into_iter()
            .find(|(_, deg)| *deg > 0)
            .map(|(id, _)| id)
            .expect("at least one phase must remain if visited < total");
        return Err(OrchestratorError::CyclicGraph(stuck));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::phase::{Criticality, RetryPolicy};
    use std::time::Duration;

    fn spec(id: &'static str, requires: &[&'static str], produces: &[&'static str]) -> PhaseSpec {
        PhaseSpec::new(
            id,
            requires.iter().copied(),
            produces.iter().copied(),
            "default",
            "noop",
            RetryPolicy::default(),
            Duration::from_secs(5),
            Criticality::Critical,
        )
    }

    #[test]
    fn builds_on_valid_linear_chain() {
        let mut specs = BTreeMap::new();
        specs.insert(PhaseId::new("a"), spec("a", &[], &["k1"]));
        specs.insert(PhaseId::new("b"), spec("b", &["a"], &["k2"]));
        let graph = DependencyGraph::build(specs).unwrap();
        let layers = graph.topological_layers();
        assert_eq!(layers[0], vec![PhaseId::new("a")]);
        assert_eq!(layers[1], vec![PhaseId::new("b")]);
    }

    #[test]
    fn rejects_cycle() {
        let mut specs = BTreeMap::new();
        specs.insert(PhaseId::new("a"), spec("a", &["b"], &["k1"]));
        specs.insert(PhaseId::new("b"), spec("b", &["a"], &["k2"]));
        assert!(matches!(DependencyGraph::build(specs), Err(OrchestratorError::CyclicGraph(_))));
    }

    #[test]
    fn rejects_unknown_requirement() {
        let mut specs = BTreeMap::new();
        specs.insert(PhaseId::new("a"), spec("a", &["ghost"], &["k1"]));
        assert!(matches!(DependencyGraph::build(specs), Err(OrchestratorError::UnknownRequirement(_, _))));
    }

    #[test]
    fn rejects_duplicate_producer() {
        let mut specs = BTreeMap::new();
        specs.insert(PhaseId::new("a"), spec("a", &[], &["k1"]));
        specs.insert(PhaseId::new("b"), spec("b", &[], &["k1"]));
        assert!(matches!(DependencyGraph::build(specs), Err(OrchestratorError::DuplicateProducer { .. })));
    }

    #[test]
    fn ready_phases_respects_predecessors() {
        let mut specs = BTreeMap::new();
        specs.insert(PhaseId::new("a"), spec("a", &[], &["k1"]));
        specs.insert(PhaseId::new("b"), spec("b", &["a"], &["k2"]));
        let graph = DependencyGraph::build(specs).unwrap();
        let ctx = WorkflowContext::new(
            crate::domain::models::WorkflowId::new("wf"),
            crate::domain::models::WorkflowType::Standard,
            graph.all_ids().cloned(),
        );
        assert_eq!(graph.ready_phases(&ctx), vec![PhaseId::new("a")]);
    }

    #[test]
    fn empty_registry_has_no_layers() {
        let graph = DependencyGraph::build(BTreeMap::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.topological_layers().is_empty());
    }
}
