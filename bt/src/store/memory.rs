//! In-memory event log with failure injection

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{EventLog, StoreError};
use crate::domain::BreakEvent;

/// Event log held in memory
///
/// Appends can be made to fail and individual days made unreadable, which is
/// how the degraded paths of the engine are exercised in tests.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    days: Mutex<BTreeMap<NaiveDate, Vec<BreakEvent>>>,
    unreadable: Mutex<HashSet<NaiveDate>>,
    fail_appends: AtomicBool,
    appends: AtomicUsize,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a day without going through `append`
    pub fn insert(&self, day: NaiveDate, event: BreakEvent) {
        self.lock_days().entry(day).or_default().push(event);
    }

    /// Snapshot of one day's events
    pub fn events(&self, day: NaiveDate) -> Vec<BreakEvent> {
        self.lock_days().get(&day).cloned().unwrap_or_default()
    }

    /// Number of successful appends so far
    pub fn append_count(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn mark_unreadable(&self, day: NaiveDate) {
        self.unreadable.lock().unwrap_or_else(|p| p.into_inner()).insert(day);
    }

    fn lock_days(&self) -> std::sync::MutexGuard<'_, BTreeMap<NaiveDate, Vec<BreakEvent>>> {
        self.days.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Io {
        path: "memory".into(),
        source: std::io::Error::other(format!("injected {} failure", what)),
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, day: NaiveDate, event: &BreakEvent) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(injected("append"));
        }
        self.insert(day, event.clone());
        self.appends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read_day(&self, day: NaiveDate) -> Result<Vec<BreakEvent>, StoreError> {
        if self.unreadable.lock().unwrap_or_else(|p| p.into_inner()).contains(&day) {
            return Err(injected("read"));
        }
        Ok(self.events(day))
    }
}
