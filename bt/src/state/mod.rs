//! Session state
//!
//! The session table, the state machine that mutates it, and the
//! reconciliation job that repairs it from the event log.

mod messages;
mod pending;
mod recovery;
mod summary;
mod table;
mod tracker;

pub use messages::{BreakEnded, BreakError, BreakStarted};
pub use pending::{PendingReasons, ReasonDraft};
pub use recovery::{
    DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS, MIN_LOOKBACK_DAYS, Reconciler, RecoveryStats, Replay, auto_close_reason,
    clamp_lookback, lookback_window, replay,
};
pub use summary::{BreakSummary, CategoryTotals, MissingBack, missing_backs, people, summarize_events};
pub use table::SessionTable;
pub use tracker::{BreakTracker, DEFAULT_REASON_TIMEOUT_SECS};
