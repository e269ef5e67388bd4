//! Domain types for BreakTime
//!
//! Core domain types: categories, events and live sessions.
//! Events are the only thing persisted; sessions are rebuilt from them.

mod category;
mod event;
mod session;

pub use category::BreakCategory;
pub use event::{
    BreakEvent, EventKind, TIMESTAMP_FORMAT, format_timestamp, minutes_between, parse_action_code, parse_timestamp,
    round_tenth,
};
pub use session::{BreakSession, Requester};

/// Stable identifier of a person
pub type PersonId = i64;

/// Identifier of a group conversation replies and reminders can go to
pub type ConversationId = i64;
