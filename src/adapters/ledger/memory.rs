//! In-memory [`LedgerSink`], used by tests and the in-process demo CLI path.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::ledger::CostEntry;
use crate::domain::ports::ledger_sink::LedgerSink;

#[derive(Default)]
pub struct InMemoryLedgerSink {
    entries: Mutex<Vec<CostEntry>>,
}

impl InMemoryLedgerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<CostEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl LedgerSink for InMemoryLedgerSink {
    async fn append(&self, entry: &CostEntry) -> OrchestratorResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}
