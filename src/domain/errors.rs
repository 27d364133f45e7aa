//! Error taxonomy for the orchestration core.

use thiserror::Error;

use crate::domain::models::phase::{AdapterId, PhaseId};

/// Top-level error surfaced by the scheduler, registry, and checkpoint store.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("cyclic dependency detected involving phase {0}")]
    CyclicGraph(PhaseId),

    #[error("phase '{0}' requires unregistered phase '{1}'")]
    UnknownRequirement(PhaseId, PhaseId),

    #[error("context key '{0}' has no producer")]
    UnproducedKey(String),

    #[error("context key '{key}' is produced by both '{first}' and '{second}'")]
    DuplicateProducer {
        key: String,
        first: PhaseId,
        second: PhaseId,
    },

    #[error("concurrency group '{group}' has an internal dependency between '{from}' and '{to}'")]
    UnsatisfiableGroup {
        group: String,
        from: PhaseId,
        to: PhaseId,
    },

    #[error("no checkpoint found for workflow {0}")]
    CheckpointNotFound(String),

    #[error("checkpoint corrupted for workflow {0}: {1}")]
    CheckpointCorrupted(String, String),

    #[error("adapter aborted the run: {0}")]
    Abort(String),

    #[error("no adapter registered for '{0}'; supply one in the adapter map passed to Orchestrator::new")]
    AdapterNotRegistered(AdapterId),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Classification of an adapter failure, used by the retry policy and the
/// scheduler's failure handling (§4.3, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Abort,
    Cancellation,
}

/// A classified, human-readable failure attached to a phase attempt.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn abort(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Abort, message)
    }

    pub fn cancellation_timeout() -> Self {
        Self::new(ErrorKind::Cancellation, "CancellationTimeout")
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
