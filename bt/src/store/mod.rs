//! Event log access
//!
//! The [`EventLog`] trait is the only way the engine touches persisted
//! events. [`JsonlEventLog`] writes day partitions through `breakstore`;
//! [`MemoryEventLog`] keeps everything in memory for tests.

pub mod jsonl;
pub mod memory;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::BreakEvent;

pub use breakstore::StoreError;
pub use jsonl::JsonlEventLog;
pub use memory::MemoryEventLog;

/// Append-only, day-partitioned log of break events
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event to the partition for `day`
    async fn append(&self, day: NaiveDate, event: &BreakEvent) -> Result<(), StoreError>;

    /// Every event of `day` in insertion order; empty when the day has no partition
    async fn read_day(&self, day: NaiveDate) -> Result<Vec<BreakEvent>, StoreError>;
}
