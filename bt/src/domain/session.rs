//! Live break sessions and the people who own them

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{BreakCategory, ConversationId, PersonId, minutes_between};

/// Who issued a command and where the reply should go
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub person_id: PersonId,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationId>,
}

impl Requester {
    pub fn new(person_id: PersonId, display_name: impl Into<String>) -> Self {
        Self {
            person_id,
            display_name: display_name.into(),
            conversation: None,
        }
    }

    pub fn in_conversation(mut self, conversation: ConversationId) -> Self {
        self.conversation = Some(conversation);
        self
    }
}

/// An open break held in the session table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakSession {
    pub person_id: PersonId,
    pub display_name: String,
    pub category: BreakCategory,
    pub started_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationId>,
    pub reminder_sent: bool,
}

impl BreakSession {
    pub fn open(requester: &Requester, category: BreakCategory, started_at: NaiveDateTime, reason: Option<String>) -> Self {
        Self {
            person_id: requester.person_id,
            display_name: requester.display_name.clone(),
            category,
            started_at,
            reason,
            conversation: requester.conversation,
            reminder_sent: false,
        }
    }

    pub fn elapsed_minutes(&self, now: NaiveDateTime) -> f64 {
        minutes_between(self.started_at, now)
    }
}
