//! Ledger sink port (§4.5).
//!
//! Independent of the checkpoint store: losing ledger entries does not
//! break orchestration correctness, so the sink is append-only and does not
//! need transactional semantics.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::ledger::CostEntry;

#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn append(&self, entry: &CostEntry) -> OrchestratorResult<()>;
}
