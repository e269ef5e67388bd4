//! Drafts of breaks waiting for a reason
//!
//! A StartBreak that needs a reason records the provisional start here. The
//! draft becomes a real session when the reason arrives, keeping the
//! original start time, or is discarded once it is older than the timeout.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};

use crate::domain::{BreakCategory, PersonId, Requester};

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonDraft {
    pub requester: Requester,
    pub category: BreakCategory,
    pub started_at: NaiveDateTime,
}

impl ReasonDraft {
    pub fn is_expired(&self, now: NaiveDateTime, timeout: Duration) -> bool {
        now - self.started_at > timeout
    }
}

#[derive(Debug, Default)]
pub struct PendingReasons {
    drafts: HashMap<PersonId, ReasonDraft>,
}

impl PendingReasons {
    /// Record a draft, replacing any earlier one for the same person
    pub fn insert(&mut self, draft: ReasonDraft) {
        self.drafts.insert(draft.requester.person_id, draft);
    }

    /// Remove and return the person's draft if it has not expired
    pub fn take(&mut self, person: PersonId, now: NaiveDateTime, timeout: Duration) -> Option<ReasonDraft> {
        self.drafts.remove(&person).filter(|draft| !draft.is_expired(now, timeout))
    }

    pub fn remove(&mut self, person: PersonId) -> Option<ReasonDraft> {
        self.drafts.remove(&person)
    }

    pub fn contains(&self, person: PersonId) -> bool {
        self.drafts.contains_key(&person)
    }

    /// Drop every expired draft, returning how many were dropped
    pub fn purge_expired(&mut self, now: NaiveDateTime, timeout: Duration) -> usize {
        let before = self.drafts.len();
        self.drafts.retain(|_, draft| !draft.is_expired(now, timeout));
        before - self.drafts.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.drafts.len();
        self.drafts.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}
