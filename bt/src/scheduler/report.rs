//! End-of-day report

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::notify::{Notification, Notifier, Recipient};
use crate::render;
use crate::state::{missing_backs, people, summarize_events};
use crate::store::EventLog;

/// Delay after midnight before the previous day is reported
const GRACE_SECS: i64 = 5;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub people: usize,
    pub missing_backs: usize,
    pub summaries_sent: usize,
    pub unreadable: bool,
}

/// Time from `now` until the next report run, just after local midnight
pub fn until_next_run(now: NaiveDateTime) -> Duration {
    let next_midnight = (now.date() + TimeDelta::days(1)).and_hms_opt(0, 0, 0).unwrap_or(now);
    let wait = next_midnight - now + TimeDelta::seconds(GRACE_SECS);
    wait.to_std().unwrap_or(Duration::from_secs(GRACE_SECS as u64))
}

/// Flags missing Backs and sends each person their day summary
pub struct DailyReport {
    log: Arc<dyn EventLog>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    send_summaries: bool,
}

impl DailyReport {
    pub fn new(log: Arc<dyn EventLog>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>, send_summaries: bool) -> Self {
        Self {
            log,
            notifier,
            clock,
            send_summaries,
        }
    }

    /// Report on `date`
    pub async fn run_for(&self, date: NaiveDate) -> ReportStats {
        debug!(%date, "DailyReport::run_for: called");
        let mut stats = ReportStats::default();

        let events = match self.log.read_day(date).await {
            Ok(events) => events,
            Err(e) => {
                warn!(%date, error = %e, "Day unreadable, no report");
                stats.unreadable = true;
                return stats;
            }
        };

        for entry in missing_backs(&events) {
            warn!(%date, "{}", render::missing_back(&entry));
            stats.missing_backs += 1;
        }

        let people = people(&events);
        stats.people = people.len();

        if self.send_summaries {
            let now = self.clock.now();
            for (person, name) in people {
                let summary = summarize_events(person, date, &events);
                let notification = Notification {
                    to: Recipient::Person(person),
                    text: render::summary(&name, &summary),
                    created_at: now,
                };
                match self.notifier.notify(notification).await {
                    Ok(()) => stats.summaries_sent += 1,
                    Err(e) => warn!(person, error = %e, "Summary delivery failed"),
                }
            }
        }

        info!(%date, people = stats.people, missing = stats.missing_backs, sent = stats.summaries_sent, "Daily report done");
        stats
    }

    /// Report on each finished day until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Daily report scheduled");
        loop {
            let wait = until_next_run(self.clock.now());
            debug!(wait_secs = wait.as_secs(), "DailyReport::run: sleeping");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let yesterday = self.clock.today() - TimeDelta::days(1);
            self.run_for(yesterday).await;
        }
        info!("Daily report stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{BreakCategory, BreakEvent};
    use crate::notify::ChannelNotifier;
    use crate::store::MemoryEventLog;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        date().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_until_next_run() {
        assert_eq!(until_next_run(at(23, 59)), Duration::from_secs(65));
        assert_eq!(until_next_run(at(0, 0)), Duration::from_secs(24 * 3600 + 5));
    }

    #[tokio::test]
    async fn test_report_sends_summaries_and_flags_missing_backs() {
        let log = Arc::new(MemoryEventLog::new());
        log.insert(date(), BreakEvent::out(1, "Ana", BreakCategory::Meal, at(12, 0), None));
        log.insert(date(), BreakEvent::back(1, "Ana", BreakCategory::Meal, at(12, 30), 30.0, None));
        log.insert(date(), BreakEvent::out(2, "Ben", BreakCategory::Smoke, at(15, 0), None));

        let (notifier, mut rx) = ChannelNotifier::new();
        let clock = Arc::new(ManualClock::new(at(23, 59) + TimeDelta::minutes(2)));
        let report = DailyReport::new(log, Arc::new(notifier), clock, true);

        let stats = report.run_for(date()).await;
        assert_eq!(stats.people, 2);
        assert_eq!(stats.missing_backs, 1);
        assert_eq!(stats.summaries_sent, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.to, Recipient::Person(1));
        assert!(first.text.contains("Total: 30 minutes"));
    }

    #[tokio::test]
    async fn test_unreadable_day() {
        let log = Arc::new(MemoryEventLog::new());
        log.mark_unreadable(date());
        let (notifier, _rx) = ChannelNotifier::new();
        let report = DailyReport::new(log, Arc::new(notifier), Arc::new(ManualClock::new(at(0, 1))), true);

        assert!(report.run_for(date()).await.unreadable);
    }
}
