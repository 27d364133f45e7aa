//! Domain layer: core types and ports, no I/O.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ErrorKind, ErrorRecord, OrchestratorError, OrchestratorResult};
