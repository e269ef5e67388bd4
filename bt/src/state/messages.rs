//! Outcomes and errors of the session state machine

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::BreakCategory;
use crate::store::StoreError;

/// Errors from state machine operations
///
/// Everything except [`BreakError::Storage`] is a user error: nothing was
/// changed and the command is safe to retry once the cause is fixed.
#[derive(Debug, Error)]
pub enum BreakError {
    #[error("Already on a {} break since {started_at}", .category.label())]
    AlreadyActive {
        category: BreakCategory,
        started_at: NaiveDateTime,
    },

    #[error("A reason is required for {} breaks", .category.label())]
    ReasonRequired {
        category: BreakCategory,
        started_at: NaiveDateTime,
    },

    #[error("No active break")]
    NoActiveBreak,

    #[error("Active break is {}, not {}", .active.label(), .requested.label())]
    CategoryMismatch {
        active: BreakCategory,
        requested: BreakCategory,
    },

    #[error("No break is waiting for a reason")]
    NoPendingReason,

    #[error("Break was not recorded: {0}")]
    Storage(#[from] StoreError),
}

impl BreakError {
    /// True for errors caused by the request rather than the system
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyActive { .. } => "already_active",
            Self::ReasonRequired { .. } => "reason_required",
            Self::NoActiveBreak => "no_active_break",
            Self::CategoryMismatch { .. } => "category_mismatch",
            Self::NoPendingReason => "no_pending_reason",
            Self::Storage(_) => "storage",
        }
    }
}

/// A break that was opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakStarted {
    pub category: BreakCategory,
    pub started_at: NaiveDateTime,
    pub reason: Option<String>,
}

/// A break that was closed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEnded {
    pub category: BreakCategory,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub duration_minutes: f64,
    pub reason: Option<String>,
}
