use std::collections::HashMap;

use async_trait::async_trait;
use labelscan_core::{HistorySink, MergedRecord, SessionId};
use tokio::sync::RwLock;

/// In-process history store keyed by session.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: RwLock<HashMap<SessionId, MergedRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<MergedRecord> {
        self.records.read().await.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn record(&self, session_id: SessionId, record: &MergedRecord) -> anyhow::Result<()> {
        self.records.write().await.insert(session_id, record.clone());
        Ok(())
    }
}
