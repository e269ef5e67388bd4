//! BreakStore - append-only, date-partitioned JSONL record store
//!
//! Records are grouped into one file per calendar day and appended one JSON
//! object per line. Partitions are only ever appended to, so a reader can
//! replay a day in insertion order without any index.
//!
//! # Layout
//!
//! ```text
//! {root}/
//! └── 2026-10/
//!     ├── break_logs_2026-10-14.jsonl
//!     ├── break_logs_2026-10-15.jsonl
//!     └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use breakstore::DayStore;
//!
//! let store: DayStore<MyRecord> = DayStore::open("database", "break_logs")?;
//! store.append(today, &record)?;
//! let records = store.read_day(today)?;
//! ```

mod error;
mod store;

pub use error::StoreError;
pub use store::{DayStore, partition_name};

/// Date format used in partition file names
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Date format used for the monthly directory
pub const MONTH_FORMAT: &str = "%Y-%m";

/// File extension of a partition
pub const PARTITION_EXT: &str = "jsonl";
