//! Append-only JSON-lines [`LedgerSink`] (§4.5).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::ledger::CostEntry;
use crate::domain::ports::ledger_sink::LedgerSink;

pub struct FileLedgerSink {
    path: PathBuf,
    // sqlx pools and OS file handles already serialise writers internally;
    // a plain file handle does not, so appends are lock-guarded to keep
    // concurrent phases from interleaving partial lines.
    lock: Mutex<()>,
}

impl FileLedgerSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl LedgerSink for FileLedgerSink {
    async fn append(&self, entry: &CostEntry) -> OrchestratorResult<()> {
        let line = serde_json::to_string(entry)?;
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ledger::AttemptOutcome;
    use crate::domain::models::phase::AdapterId;
    use crate::domain::models::workflow::WorkflowId;
    use chrono::Utc;

    #[tokio::test]
    async fn appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let sink = FileLedgerSink::new(&path);

        let entry = CostEntry {
            workflow_id: WorkflowId::new("wf"),
            phase_id: "phase".to_string(),
            attempt: 1,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            outcome: AttemptOutcome::Succeeded,
            adapter: AdapterId::new("adapter"),
            cost_amount: 0.5,
            cost_currency: Some("USD".to_string()),
            notes: None,
        };
        sink.append(&entry).await.unwrap();
        sink.append(&entry).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
