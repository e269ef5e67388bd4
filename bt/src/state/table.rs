//! Session table
//!
//! The only mutable shared state of the engine: live sessions keyed by
//! person plus the drafts waiting for a reason. A single table-wide lock
//! makes every check-then-create or check-then-delete sequence atomic.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use super::pending::PendingReasons;
use crate::domain::{BreakSession, PersonId};

/// Contents guarded by the table lock
#[derive(Debug, Default)]
pub struct TableInner {
    pub(crate) sessions: HashMap<PersonId, BreakSession>,
    pub(crate) pending: PendingReasons,
}

impl TableInner {
    /// Drop every session and draft, returning how many sessions were dropped
    pub(crate) fn clear(&mut self) -> usize {
        let sessions = self.sessions.len();
        let drafts = self.pending.clear();
        self.sessions.clear();
        debug!(sessions, drafts, "TableInner::clear: cleared");
        sessions
    }
}

/// Shared handle to the session table
#[derive(Debug, Clone, Default)]
pub struct SessionTable {
    inner: Arc<Mutex<TableInner>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the whole table for an atomic read-modify-write
    pub(crate) async fn lock(&self) -> MutexGuard<'_, TableInner> {
        self.inner.lock().await
    }

    pub async fn get(&self, person: PersonId) -> Option<BreakSession> {
        self.lock().await.sessions.get(&person).cloned()
    }

    pub async fn is_active(&self, person: PersonId) -> bool {
        self.lock().await.sessions.contains_key(&person)
    }

    pub async fn has_pending_reason(&self, person: PersonId) -> bool {
        self.lock().await.pending.contains(person)
    }

    /// Copy of every live session, ordered by person
    pub async fn snapshot(&self) -> Vec<BreakSession> {
        let mut sessions: Vec<_> = self.lock().await.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.person_id);
        sessions
    }

    pub async fn len(&self) -> usize {
        self.lock().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lock().await.sessions.is_empty()
    }

    /// Latch the reminder flag of the session that started at `started_at`
    ///
    /// Returns true only for the call that flipped the flag, so a reminder
    /// can be dispatched at most once per session.
    pub async fn mark_reminded(&self, person: PersonId, started_at: NaiveDateTime) -> bool {
        let mut inner = self.lock().await;
        match inner.sessions.get_mut(&person) {
            Some(session) if session.started_at == started_at && !session.reminder_sent => {
                session.reminder_sent = true;
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, session: BreakSession) {
        self.lock().await.sessions.insert(session.person_id, session);
    }

    pub async fn purge_expired_drafts(&self, now: NaiveDateTime, timeout: Duration) -> usize {
        let purged = self.lock().await.pending.purge_expired(now, timeout);
        if purged > 0 {
            debug!(purged, "SessionTable::purge_expired_drafts: dropped drafts");
        }
        purged
    }

    /// Drop every session and draft, returning how many sessions were dropped
    pub async fn clear(&self) -> usize {
        self.lock().await.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BreakCategory, Requester};
    use chrono::NaiveDate;

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    async fn seeded(person: PersonId) -> SessionTable {
        let table = SessionTable::new();
        table
            .seed(BreakSession::open(&Requester::new(person, "P"), BreakCategory::Smoke, start(), None))
            .await;
        table
    }

    #[tokio::test]
    async fn test_mark_reminded_latches_once() {
        let table = seeded(1).await;
        assert!(table.mark_reminded(1, start()).await);
        assert!(!table.mark_reminded(1, start()).await);
        assert!(table.get(1).await.unwrap().reminder_sent);
    }

    #[tokio::test]
    async fn test_mark_reminded_ignores_other_session() {
        let table = seeded(1).await;
        assert!(!table.mark_reminded(1, start() + Duration::seconds(1)).await);
        assert!(!table.mark_reminded(2, start()).await);
    }

    #[tokio::test]
    async fn test_clear() {
        let table = seeded(1).await;
        assert_eq!(table.clear().await, 1);
        assert!(table.is_empty().await);
        assert!(table.snapshot().await.is_empty());
    }
}
