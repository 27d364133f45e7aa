//! Port traits the orchestration core depends on; adapters live outside this crate's core.

pub mod adapter;
pub mod checkpoint_store;
pub mod ledger_sink;

pub use adapter::{Adapter, AdapterOutcome, PhaseInputSnapshot};
pub use checkpoint_store::CheckpointStore;
pub use ledger_sink::LedgerSink;
