//! Phase identifiers and the static [`PhaseSpec`] shape (§3, §4.4).

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Closed-set identifier for a phase. Backed by a string so the registry can
/// be extended without a recompile of the scheduler, but treated as an opaque
/// key everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhaseId(pub String);

impl PhaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PhaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier for an external capability a phase invokes (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AdapterId(pub String);

impl AdapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for AdapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Label allowing phases whose dependencies are satisfied to run in parallel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConcurrencyGroup(pub String);

impl ConcurrencyGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ConcurrencyGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a phase's terminal failure aborts the run (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    BestEffort,
}

/// Bounded exponential backoff with jitter (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, jitter_fraction: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter_fraction,
        }
    }

    /// `delay = min(max_delay, base_delay * 2^(attempts-1)) * (1 + uniform(-jitter, +jitter))`.
    ///
    /// `jitter_sample` is a caller-supplied value in `[-1.0, 1.0]` so the
    /// formula stays deterministic under test (S2 pins `jitter_fraction=0`).
    pub fn backoff_for_attempt(&self, attempts: u32, jitter_sample: f64) -> Duration {
        debug_assert!(attempts >= 1);
        let exp = attempts.saturating_sub(1).min(32);
        let scaled = self.base_delay.saturating_mul(1u32 << exp);
        let capped = scaled.min(self.max_delay);
        let jitter = 1.0 + (jitter_sample.clamp(-1.0, 1.0) * self.jitter_fraction);
        let jitter = jitter.max(0.0);
        capped.mul_f64(jitter)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_fraction: 0.2,
        }
    }
}

/// Immutable catalogue entry (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub id: PhaseId,
    pub requires: BTreeSet<PhaseId>,
    pub produces: BTreeSet<String>,
    pub group: ConcurrencyGroup,
    pub adapter: AdapterId,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub criticality: Criticality,
    /// Keys this phase tolerates being absent from the context (§4.9).
    pub accepts_missing: BTreeSet<String>,
    /// Whether a timeout on this phase classifies as `Permanent` rather than
    /// the default `Transient` (§4.9).
    pub timeout_is_permanent: bool,
}

impl PhaseSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        requires: impl IntoIterator<Item = &'static str>,
        produces: impl IntoIterator<Item = &'static str>,
        group: impl Into<String>,
        adapter: impl Into<String>,
        retry: RetryPolicy,
        timeout: Duration,
        criticality: Criticality,
    ) -> Self {
        Self {
            id: PhaseId::new(id),
            requires: requires.into_iter().map(PhaseId::new).collect(),
            produces: produces.into_iter().map(String::from).collect(),
            group: ConcurrencyGroup::new(group),
            adapter: AdapterId::new(adapter),
            retry,
            timeout,
            criticality,
            accepts_missing: BTreeSet::new(),
            timeout_is_permanent: false,
        }
    }

    pub fn with_accepts_missing(mut self, keys: impl IntoIterator<Item = &'static str>) -> Self {
        self.accepts_missing = keys.into_iter().map(String::from).collect();
        self
    }

    pub fn with_timeout_permanent(mut self, permanent: bool) -> Self {
        self.timeout_is_permanent = permanent;
        self
    }
}
