//! JSONL-backed event log

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use breakstore::{DayStore, StoreError};
use chrono::NaiveDate;
use tracing::debug;

use super::EventLog;
use crate::domain::BreakEvent;

/// Event log stored as one JSONL file per day under `root/YYYY-MM/`
#[derive(Clone)]
pub struct JsonlEventLog {
    store: Arc<DayStore<BreakEvent>>,
}

impl JsonlEventLog {
    pub fn open(root: impl AsRef<Path>, prefix: &str) -> Result<Self, StoreError> {
        debug!(root = %root.as_ref().display(), %prefix, "JsonlEventLog::open: called");
        let store = DayStore::open(root, prefix)?;
        Ok(Self { store: Arc::new(store) })
    }
}

#[async_trait]
impl EventLog for JsonlEventLog {
    async fn append(&self, day: NaiveDate, event: &BreakEvent) -> Result<(), StoreError> {
        let store = Arc::clone(&self.store);
        let event = event.clone();
        tokio::task::spawn_blocking(move || store.append(day, &event))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn read_day(&self, day: NaiveDate) -> Result<Vec<BreakEvent>, StoreError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.read_day(day))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
