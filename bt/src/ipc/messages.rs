//! IPC message types for daemon communication
//!
//! Simple JSON-over-newline protocol. Each message is a single line of JSON followed by `\n`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{BreakCategory, BreakSession, ConversationId, EventKind, PersonId, Requester};
use crate::notify::Notification;
use crate::state::RecoveryStats;
use crate::sync::SyncStatus;

/// Largest accepted request line
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// Messages from CLI/chat bridge to Daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum DaemonMessage {
    /// Start or end a break
    Break {
        person_id: PersonId,
        display_name: String,
        action: EventKind,
        category: BreakCategory,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation: Option<ConversationId>,
    },

    /// Supply the reason for a pending Other break
    ProvideReason {
        person_id: PersonId,
        display_name: String,
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation: Option<ConversationId>,
    },

    /// Abandon a pending Other break
    CancelReason { person_id: PersonId, display_name: String },

    /// Summary for one person; today when no date is given
    Summary {
        person_id: PersonId,
        display_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
    },

    /// Snapshot of every open session
    Active,

    /// Run reconciliation now
    Reconcile,

    /// Drain queued notifications
    Notifications,

    /// Ping to check if daemon is alive
    Ping,

    /// Version, open sessions and replication counters
    Status,

    /// Request daemon to stop gracefully
    Shutdown,
}

impl DaemonMessage {
    /// Build a Break request from a requester
    pub fn break_action(who: &Requester, action: EventKind, category: BreakCategory, reason: Option<String>) -> Self {
        Self::Break {
            person_id: who.person_id,
            display_name: who.display_name.clone(),
            action,
            category,
            reason,
            conversation: who.conversation,
        }
    }
}

/// What a running daemon reports about itself
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonHealth {
    pub version: String,
    pub active_sessions: usize,
    /// None when sync is disabled
    #[serde(default)]
    pub sync: Option<SyncStatus>,
}

/// Responses from Daemon to CLI/chat bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum DaemonResponse {
    /// Acknowledgment
    Ok,

    /// Rendered outcome of a command
    Reply { success: bool, text: String },

    /// Open sessions, ordered by person
    Sessions { sessions: Vec<BreakSession> },

    /// Reconciliation result
    Recovered { stats: RecoveryStats },

    /// Queued notifications, oldest first
    Notifications { items: Vec<Notification> },

    /// Pong response to ping
    Pong { version: String },

    /// Answer to a status request
    Status { health: DaemonHealth },

    /// Error response
    Error { message: String },
}
