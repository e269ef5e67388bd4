//! BreakTime - break session tracking engine
//!
//! People announce when they step out (meal, restroom, smoke, other) and
//! when they come back. BreakTime keeps one open session per person,
//! appends every Out and Back to a day-partitioned event log, reminds
//! people who overstay, closes breaks that were never ended and mirrors
//! every event to a remote workbook table.
//!
//! # Modules
//!
//! - [`domain`] - Categories, events and sessions
//! - [`state`] - Session table, state machine, summaries and reconciliation
//! - [`store`] - Event log trait with JSONL and in-memory implementations
//! - [`sync`] - Remote replication behind a circuit breaker
//! - [`scheduler`] - Reminder and end-of-day report loops
//! - [`watcher`] - Admin reset flag watcher
//! - [`ipc`] - Daemon socket protocol, server and client
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod ipc;
pub mod notify;
pub mod render;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod sync;
pub mod watcher;

/// Version reported by the CLI and the daemon
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use domain::{BreakCategory, BreakEvent, BreakSession, EventKind, PersonId, Requester};
pub use notify::{Notification, Notifier, OutboxNotifier, Recipient};
pub use state::{
    BreakEnded, BreakError, BreakStarted, BreakSummary, BreakTracker, Reconciler, RecoveryStats, SessionTable,
};
pub use store::{EventLog, JsonlEventLog, MemoryEventLog, StoreError};
pub use sync::{CircuitBreaker, SyncError, SyncGateway, SyncHandle, SyncWorker};
