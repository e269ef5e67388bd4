//! Watcher module for the admin reset flag
//!
//! The ResetWatcher polls for a flag file and, when it appears, reconciles
//! the event log and clears every live session.

mod reset;

pub use reset::{ResetWatcher, request_reset};
