//! Reminder scheduler

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ReminderConfig;
use crate::domain::BreakSession;
use crate::notify::{Notification, Notifier, Recipient};
use crate::render;
use crate::state::SessionTable;

/// Sends one reminder per session once it runs past its category's threshold
pub struct ReminderScheduler {
    table: SessionTable,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(table: SessionTable, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, config: ReminderConfig) -> Self {
        Self {
            table,
            notifier,
            clock,
            config,
        }
    }

    /// Sessions from `sessions` that are due a reminder at `now`, with their limit
    pub fn due<'a>(&self, sessions: &'a [BreakSession], now: NaiveDateTime) -> Vec<(&'a BreakSession, u32)> {
        sessions
            .iter()
            .filter(|s| !s.reminder_sent)
            .filter_map(|s| self.config.threshold(s.category).map(|limit| (s, limit)))
            .filter(|(s, limit)| s.elapsed_minutes(now) >= f64::from(*limit))
            .collect()
    }

    /// Run one pass; returns the number of reminders dispatched
    pub async fn tick(&self) -> usize {
        let now = self.clock.now();
        self.table.purge_expired_drafts(now, self.config.reason_timeout()).await;

        let sessions = self.table.snapshot().await;
        let mut sent = 0;

        for (session, limit) in self.due(&sessions, now) {
            // Latch before sending: at most one reminder per session
            if !self.table.mark_reminded(session.person_id, session.started_at).await {
                continue;
            }

            let elapsed = session.elapsed_minutes(now);
            let notification = Notification {
                to: Recipient::route(session.person_id, session.conversation),
                text: render::reminder(session, elapsed, limit),
                created_at: now,
            };
            match self.notifier.notify(notification).await {
                Ok(()) => {
                    sent += 1;
                    info!(person = session.person_id, category = %session.category, elapsed, limit, "Reminder sent");
                }
                Err(e) => warn!(person = session.person_id, error = %e, "Reminder delivery failed"),
            }
        }

        debug!(sent, active = sessions.len(), "ReminderScheduler::tick: done");
        sent
    }

    /// Tick every interval until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.interval().max(Duration::from_secs(1));
        info!(interval_secs = interval.as_secs(), "Reminder scheduler started");

        loop {
            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("Reminder scheduler stopped");
    }
}
