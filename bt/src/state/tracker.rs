//! Session state machine
//!
//! `BreakTracker` validates commands against the session table, writes the
//! resulting events and hands them to the sync worker. The table lock is
//! held from the check through the append, so two concurrent commands for
//! the same person can never both succeed.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use super::messages::{BreakEnded, BreakError, BreakStarted};
use super::pending::ReasonDraft;
use super::summary::{BreakSummary, summarize_events};
use super::table::SessionTable;
use crate::clock::Clock;
use crate::domain::{BreakCategory, BreakEvent, BreakSession, PersonId, Requester, minutes_between};
use crate::store::EventLog;
use crate::sync::SyncHandle;

/// Default lifetime of a draft waiting for a reason, in seconds
pub const DEFAULT_REASON_TIMEOUT_SECS: i64 = 600;

#[derive(Clone)]
pub struct BreakTracker {
    table: SessionTable,
    log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
    sync: Option<SyncHandle>,
    reason_timeout: Duration,
}

impl BreakTracker {
    pub fn new(table: SessionTable, log: Arc<dyn EventLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table,
            log,
            clock,
            sync: None,
            reason_timeout: Duration::seconds(DEFAULT_REASON_TIMEOUT_SECS),
        }
    }

    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_reason_timeout(mut self, timeout: Duration) -> Self {
        self.reason_timeout = timeout;
        self
    }

    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    pub fn reason_timeout(&self) -> Duration {
        self.reason_timeout
    }

    /// Open a break for `who`
    ///
    /// Breaks that need a reason and arrive without one are parked as a
    /// draft and reported as [`BreakError::ReasonRequired`].
    pub async fn start_break(
        &self,
        who: &Requester,
        category: BreakCategory,
        reason: Option<String>,
    ) -> Result<BreakStarted, BreakError> {
        debug!(person = who.person_id, %category, "BreakTracker::start_break: called");
        let reason = normalize_reason(reason);
        let now = self.clock.now();

        let mut inner = self.table.lock().await;
        if let Some(active) = inner.sessions.get(&who.person_id) {
            debug!(person = who.person_id, active = %active.category, "BreakTracker::start_break: already active");
            return Err(BreakError::AlreadyActive {
                category: active.category,
                started_at: active.started_at,
            });
        }

        if category.requires_reason() && reason.is_none() {
            inner.pending.insert(ReasonDraft {
                requester: who.clone(),
                category,
                started_at: now,
            });
            info!(person = who.person_id, %category, started_at = %now, "Break waiting for a reason");
            return Err(BreakError::ReasonRequired {
                category,
                started_at: now,
            });
        }

        inner.pending.remove(who.person_id);
        let session = BreakSession::open(who, category, now, reason);
        let event = BreakEvent::out(who.person_id, &who.display_name, category, now, session.reason.clone());
        self.log.append(now.date(), &event).await?;

        let started = BreakStarted {
            category,
            started_at: session.started_at,
            reason: session.reason.clone(),
        };
        inner.sessions.insert(who.person_id, session);
        drop(inner);

        info!(person = who.person_id, %category, started_at = %now, "Break started");
        self.dispatch(event);
        Ok(started)
    }

    /// Complete a parked break with its reason, keeping the original start time
    pub async fn provide_reason(&self, who: &Requester, reason: String) -> Result<BreakStarted, BreakError> {
        debug!(person = who.person_id, "BreakTracker::provide_reason: called");
        let now = self.clock.now();

        let mut inner = self.table.lock().await;
        let Some(draft) = inner.pending.take(who.person_id, now, self.reason_timeout) else {
            debug!(person = who.person_id, "BreakTracker::provide_reason: no live draft");
            return Err(BreakError::NoPendingReason);
        };

        let Some(reason) = normalize_reason(Some(reason)) else {
            let category = draft.category;
            let started_at = draft.started_at;
            inner.pending.insert(draft);
            return Err(BreakError::ReasonRequired { category, started_at });
        };

        if let Some(active) = inner.sessions.get(&who.person_id) {
            return Err(BreakError::AlreadyActive {
                category: active.category,
                started_at: active.started_at,
            });
        }

        let mut requester = draft.requester.clone();
        if who.conversation.is_some() {
            requester.conversation = who.conversation;
        }
        let session = BreakSession::open(&requester, draft.category, draft.started_at, Some(reason));
        let event = BreakEvent::out(
            requester.person_id,
            &requester.display_name,
            draft.category,
            draft.started_at,
            session.reason.clone(),
        );

        // Written to the partition of the day the reason arrived; the event keeps the original start
        if let Err(e) = self.log.append(now.date(), &event).await {
            inner.pending.insert(draft);
            return Err(e.into());
        }

        let started = BreakStarted {
            category: session.category,
            started_at: session.started_at,
            reason: session.reason.clone(),
        };
        inner.sessions.insert(who.person_id, session);
        drop(inner);

        info!(person = who.person_id, category = %started.category, started_at = %started.started_at, "Break started after reason");
        self.dispatch(event);
        Ok(started)
    }

    /// Discard a parked break; returns whether there was one
    pub async fn cancel_reason(&self, person: PersonId) -> bool {
        debug!(person, "BreakTracker::cancel_reason: called");
        self.table.lock().await.pending.remove(person).is_some()
    }

    /// Close the person's break, which must be of `category`
    pub async fn end_break(&self, who: &Requester, category: BreakCategory) -> Result<BreakEnded, BreakError> {
        debug!(person = who.person_id, %category, "BreakTracker::end_break: called");
        let now = self.clock.now();

        let mut inner = self.table.lock().await;
        let Some(session) = inner.sessions.get(&who.person_id) else {
            return Err(BreakError::NoActiveBreak);
        };
        if session.category != category {
            return Err(BreakError::CategoryMismatch {
                active: session.category,
                requested: category,
            });
        }

        let duration = minutes_between(session.started_at, now);
        let event = BreakEvent::back(
            who.person_id,
            &who.display_name,
            category,
            now,
            duration,
            session.reason.clone(),
        );
        self.log.append(now.date(), &event).await?;

        let ended = BreakEnded {
            category,
            started_at: session.started_at,
            ended_at: now,
            duration_minutes: duration,
            reason: session.reason.clone(),
        };
        inner.sessions.remove(&who.person_id);
        drop(inner);

        info!(person = who.person_id, %category, duration, "Break ended");
        self.dispatch(event);
        Ok(ended)
    }

    /// The person's live session, if any
    pub async fn active(&self, person: PersonId) -> Option<BreakSession> {
        self.table.get(person).await
    }

    /// Totals for `date` plus the live session, if any
    pub async fn summarize(&self, person: PersonId, date: NaiveDate) -> BreakSummary {
        debug!(person, %date, "BreakTracker::summarize: called");
        let events = match self.log.read_day(date).await {
            Ok(events) => events,
            Err(e) => {
                warn!(%date, error = %e, "Day unreadable, summarizing as empty");
                Vec::new()
            }
        };
        let mut summary = summarize_events(person, date, &events);
        summary.active = self.table.get(person).await;
        summary
    }

    fn dispatch(&self, event: BreakEvent) {
        if let Some(sync) = &self.sync {
            sync.enqueue(event);
        }
    }
}

fn normalize_reason(reason: Option<String>) -> Option<String> {
    reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty())
}
