//! Orphan recovery
//!
//! Replays the most recent days of the event log, finds every Out that never
//! received a Back and closes it with a synthetic Back written to today's
//! partition. The synthetic Back is an ordinary event, so a second run
//! replays it and finds nothing left to close.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::table::{SessionTable, TableInner};
use crate::clock::Clock;
use crate::domain::{BreakEvent, EventKind, PersonId, minutes_between};
use crate::store::EventLog;
use crate::sync::SyncHandle;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 3;
pub const MIN_LOOKBACK_DAYS: u32 = 1;
pub const MAX_LOOKBACK_DAYS: u32 = 7;

/// Recovery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStats {
    /// Days replayed successfully
    pub days_scanned: usize,
    /// Days skipped because they could not be read
    pub days_skipped: usize,
    /// Synthetic Backs written
    pub orphans_closed: usize,
    /// Live sessions removed because their Out was closed
    pub sessions_cleared: usize,
    /// Backs with no preceding Out
    pub anomalies: usize,
    /// Synthetic Backs that could not be written
    pub append_failures: usize,
}

impl std::fmt::Display for RecoveryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "days: {} scanned / {} skipped, orphans closed: {}, sessions cleared: {}, anomalies: {}, append failures: {}",
            self.days_scanned,
            self.days_skipped,
            self.orphans_closed,
            self.sessions_cleared,
            self.anomalies,
            self.append_failures
        )
    }
}

/// Result of replaying a window of events
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Replay {
    /// The last unmatched Out of each person, ordered by person
    pub orphans: Vec<BreakEvent>,
    /// Backs that arrived for a person with nothing open
    pub anomalies: Vec<BreakEvent>,
}

/// Replay events oldest first and return what is left open
///
/// Tracking is per person: a newer Out replaces an older unmatched one and
/// any Back closes whatever is open.
pub fn replay<'a>(events: impl IntoIterator<Item = &'a BreakEvent>) -> Replay {
    let mut open: BTreeMap<PersonId, &BreakEvent> = BTreeMap::new();
    let mut anomalies = Vec::new();

    for event in events {
        match event.kind {
            EventKind::Out => {
                if let Some(previous) = open.insert(event.person_id, event) {
                    debug!(person = event.person_id, superseded = %previous.timestamp, "replay: newer Out replaces unmatched Out");
                }
            }
            EventKind::Back => {
                if open.remove(&event.person_id).is_none() {
                    anomalies.push(event.clone());
                }
            }
        }
    }

    Replay {
        orphans: open.into_values().cloned().collect(),
        anomalies,
    }
}

/// Days in the lookback window ending at `today`, oldest first
pub fn lookback_window(today: NaiveDate, lookback_days: u32) -> Vec<NaiveDate> {
    let days = clamp_lookback(lookback_days);
    (0..days)
        .rev()
        .map(|back| today - Duration::days(i64::from(back)))
        .collect()
}

pub fn clamp_lookback(lookback_days: u32) -> u32 {
    lookback_days.clamp(MIN_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS)
}

/// Reason text stored on a synthetic Back
pub fn auto_close_reason(origin: &str) -> String {
    format!("auto-closed, originated {}", origin)
}

/// Reconciliation job over the event log and the session table
#[derive(Clone)]
pub struct Reconciler {
    log: Arc<dyn EventLog>,
    table: SessionTable,
    clock: Arc<dyn Clock>,
    sync: Option<SyncHandle>,
    lookback_days: u32,
}

impl Reconciler {
    pub fn new(log: Arc<dyn EventLog>, table: SessionTable, clock: Arc<dyn Clock>, lookback_days: u32) -> Self {
        let clamped = clamp_lookback(lookback_days);
        if clamped != lookback_days {
            warn!(requested = lookback_days, used = clamped, "Lookback outside 1..=7, clamped");
        }
        Self {
            log,
            table,
            clock,
            sync: None,
            lookback_days: clamped,
        }
    }

    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    /// Close every orphaned Out in the lookback window
    ///
    /// The table lock is held for the whole pass, the same way the tracker
    /// holds it across its own appends. A command for any person waits until
    /// the synthetic Backs are written, so no Out can land between the replay
    /// and the Back that closes it.
    pub async fn run(&self) -> RecoveryStats {
        debug!(lookback = self.lookback_days, "Reconciler::run: called");
        let mut inner = self.table.lock().await;
        self.reconcile(&mut inner).await
    }

    /// Reconcile, then drop every remaining session and draft in the same pass
    pub async fn reset(&self) -> RecoveryStats {
        debug!("Reconciler::reset: called");
        let mut inner = self.table.lock().await;
        let mut stats = self.reconcile(&mut inner).await;
        stats.sessions_cleared += inner.clear();
        drop(inner);
        info!("Reset complete: {}", stats);
        stats
    }

    async fn reconcile(&self, inner: &mut TableInner) -> RecoveryStats {
        let now = self.clock.now();
        let today = now.date();
        let mut stats = RecoveryStats::default();

        let mut events = Vec::new();
        for day in lookback_window(today, self.lookback_days) {
            match self.log.read_day(day).await {
                Ok(day_events) => {
                    stats.days_scanned += 1;
                    events.extend(day_events);
                }
                Err(e) => {
                    stats.days_skipped += 1;
                    warn!(%day, error = %e, "Skipping unreadable partition");
                }
            }
        }

        let replayed = replay(&events);
        stats.anomalies = replayed.anomalies.len();
        for anomaly in &replayed.anomalies {
            warn!(
                person = anomaly.person_id,
                category = %anomaly.category,
                timestamp = %anomaly.timestamp,
                "Data integrity: Back without a preceding Out"
            );
        }

        for orphan in replayed.orphans {
            let started_at = orphan.time();
            let duration = match started_at {
                Ok(started_at) => minutes_between(started_at, now),
                Err(e) => {
                    warn!(person = orphan.person_id, timestamp = %orphan.timestamp, error = %e, "Malformed Out timestamp, using zero duration");
                    0.0
                }
            };

            let origin = started_at
                .map(|t| t.date().to_string())
                .unwrap_or_else(|_| orphan.timestamp.clone());
            let back = BreakEvent::back(
                orphan.person_id,
                &orphan.display_name,
                orphan.category,
                now,
                duration,
                Some(auto_close_reason(&origin)),
            );

            if let Err(e) = self.log.append(today, &back).await {
                stats.append_failures += 1;
                warn!(person = orphan.person_id, error = %e, "Failed to write synthetic Back");
                continue;
            }

            stats.orphans_closed += 1;
            let live = inner
                .sessions
                .get(&orphan.person_id)
                .is_some_and(|session| started_at.as_ref().is_ok_and(|t| *t == session.started_at));
            if live {
                inner.sessions.remove(&orphan.person_id);
                stats.sessions_cleared += 1;
            }
            info!(person = orphan.person_id, category = %orphan.category, %origin, duration, "Auto-closed orphaned break");
            if let Some(sync) = &self.sync {
                sync.enqueue(back);
            }
        }

        if stats.orphans_closed > 0 || stats.anomalies > 0 || stats.days_skipped > 0 {
            info!("Reconciliation: {}", stats);
        } else {
            debug!("Reconciliation found nothing to close: {}", stats);
        }
        stats
    }
}
