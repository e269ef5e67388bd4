//! Request dispatch for the daemon
//!
//! Turns one [`DaemonMessage`] into one [`DaemonResponse`]. Outcomes of the
//! state machine are rendered to text here so every client shows the same
//! wording.

use std::sync::Arc;

use tracing::{debug, error};

use super::messages::{DaemonHealth, DaemonMessage, DaemonResponse};
use crate::clock::Clock;
use crate::domain::{BreakCategory, ConversationId, EventKind, PersonId, Requester};
use crate::notify::OutboxNotifier;
use crate::render;
use crate::state::{BreakError, BreakTracker, Reconciler};
use crate::sync::SyncMonitor;

pub struct CommandHandler {
    tracker: Arc<BreakTracker>,
    reconciler: Arc<Reconciler>,
    outbox: Arc<OutboxNotifier>,
    clock: Arc<dyn Clock>,
    sync: Option<SyncMonitor>,
}

impl CommandHandler {
    pub fn new(
        tracker: Arc<BreakTracker>,
        reconciler: Arc<Reconciler>,
        outbox: Arc<OutboxNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            reconciler,
            outbox,
            clock,
            sync: None,
        }
    }

    /// Report replication counters in status answers
    pub fn with_sync_monitor(mut self, monitor: SyncMonitor) -> Self {
        self.sync = Some(monitor);
        self
    }

    /// Handle one request
    ///
    /// `Shutdown` is acknowledged here; stopping the daemon is up to the caller.
    pub async fn handle(&self, msg: DaemonMessage) -> DaemonResponse {
        debug!(?msg, "CommandHandler::handle: called");
        match msg {
            DaemonMessage::Break {
                person_id,
                display_name,
                action,
                category,
                reason,
                conversation,
            } => {
                let who = requester(person_id, display_name, conversation);
                self.break_action(&who, action, category, reason).await
            }
            DaemonMessage::ProvideReason {
                person_id,
                display_name,
                reason,
                conversation,
            } => {
                let who = requester(person_id, display_name, conversation);
                match self.tracker.provide_reason(&who, reason).await {
                    Ok(started) => reply(true, render::started(&who.display_name, &started)),
                    Err(e) => failure(&who, &e),
                }
            }
            DaemonMessage::CancelReason {
                person_id,
                display_name,
            } => {
                if self.tracker.cancel_reason(person_id).await {
                    reply(true, format!("{}, your pending break was cancelled.", display_name))
                } else {
                    let who = Requester::new(person_id, display_name);
                    failure(&who, &BreakError::NoPendingReason)
                }
            }
            DaemonMessage::Summary {
                person_id,
                display_name,
                date,
            } => {
                let date = date.unwrap_or_else(|| self.clock.today());
                let summary = self.tracker.summarize(person_id, date).await;
                reply(true, render::summary(&display_name, &summary))
            }
            DaemonMessage::Active => DaemonResponse::Sessions {
                sessions: self.tracker.table().snapshot().await,
            },
            DaemonMessage::Reconcile => DaemonResponse::Recovered {
                stats: self.reconciler.run().await,
            },
            DaemonMessage::Notifications => DaemonResponse::Notifications {
                items: self.outbox.drain(),
            },
            DaemonMessage::Ping => DaemonResponse::Pong {
                version: crate::VERSION.to_string(),
            },
            DaemonMessage::Status => DaemonResponse::Status {
                health: DaemonHealth {
                    version: crate::VERSION.to_string(),
                    active_sessions: self.tracker.table().len().await,
                    sync: self.sync.as_ref().map(SyncMonitor::status),
                },
            },
            DaemonMessage::Shutdown => DaemonResponse::Ok,
        }
    }

    async fn break_action(
        &self,
        who: &Requester,
        action: EventKind,
        category: BreakCategory,
        reason: Option<String>,
    ) -> DaemonResponse {
        match action {
            EventKind::Out => match self.tracker.start_break(who, category, reason).await {
                Ok(started) => reply(true, render::started(&who.display_name, &started)),
                Err(e) => failure(who, &e),
            },
            EventKind::Back => match self.tracker.end_break(who, category).await {
                Ok(ended) => reply(true, render::ended(&who.display_name, &ended)),
                Err(e) => failure(who, &e),
            },
        }
    }
}

fn requester(person_id: PersonId, display_name: String, conversation: Option<ConversationId>) -> Requester {
    let who = Requester::new(person_id, display_name);
    match conversation {
        Some(id) => who.in_conversation(id),
        None => who,
    }
}

fn reply(success: bool, text: String) -> DaemonResponse {
    DaemonResponse::Reply { success, text }
}

fn failure(who: &Requester, e: &BreakError) -> DaemonResponse {
    if e.is_user_error() {
        debug!(person = who.person_id, kind = e.kind(), "Command refused");
    } else {
        error!(person = who.person_id, kind = e.kind(), error = %e, "Command failed");
    }
    reply(false, render::error(&who.display_name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::{Notification, Notifier, Recipient};
    use crate::state::SessionTable;
    use crate::store::{EventLog, MemoryEventLog};
    use crate::sync::{BreakerPhase, BreakerStats, CircuitBreaker, SyncError, SyncGateway, SyncHandle, SyncWorker};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

    struct Unreachable;

    #[async_trait]
    impl SyncGateway for Unreachable {
        async fn push(&self, _event: &crate::domain::BreakEvent) -> Result<(), SyncError> {
            Err(SyncError::NotConfigured("unreachable".to_string()))
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    /// A queue of one with no running worker: the second event is dropped
    fn worker_with_full_queue() -> (SyncHandle, SyncWorker) {
        let (worker, handle) = SyncWorker::new(Arc::new(Unreachable), Arc::new(CircuitBreaker::default()), 1);
        (handle, worker)
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    struct Fixture {
        handler: CommandHandler,
        log: Arc<MemoryEventLog>,
        clock: Arc<ManualClock>,
        outbox: Arc<OutboxNotifier>,
    }

    fn fixture() -> Fixture {
        let log = Arc::new(MemoryEventLog::new());
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let table = SessionTable::new();
        let tracker = Arc::new(BreakTracker::new(table.clone(), log.clone(), clock.clone()));
        let reconciler = Arc::new(Reconciler::new(log.clone(), table, clock.clone(), 3));
        let outbox = Arc::new(OutboxNotifier::new(16));
        let handler = CommandHandler::new(tracker, reconciler, outbox.clone(), clock.clone());
        Fixture {
            handler,
            log,
            clock,
            outbox,
        }
    }

    fn out(person: i64, category: BreakCategory) -> DaemonMessage {
        DaemonMessage::break_action(&Requester::new(person, "Ana"), EventKind::Out, category, None)
    }

    fn back(person: i64, category: BreakCategory) -> DaemonMessage {
        DaemonMessage::break_action(&Requester::new(person, "Ana"), EventKind::Back, category, None)
    }

    #[tokio::test]
    async fn test_out_then_back_replies() {
        let f = fixture();

        let resp = f.handler.handle(out(1, BreakCategory::Meal)).await;
        assert!(matches!(resp, DaemonResponse::Reply { success: true, .. }));

        f.clock.advance(TimeDelta::seconds(18 * 60 + 30));
        match f.handler.handle(back(1, BreakCategory::Meal)).await {
            DaemonResponse::Reply { success, text } => {
                assert!(success);
                assert!(text.contains("Duration: 18.5 minutes"));
            }
            other => panic!("Expected Reply, got {:?}", other),
        }
        assert_eq!(f.log.append_count(), 2);
    }

    #[tokio::test]
    async fn test_user_error_is_unsuccessful_reply() {
        let f = fixture();
        match f.handler.handle(back(1, BreakCategory::Smoke)).await {
            DaemonResponse::Reply { success, text } => {
                assert!(!success);
                assert!(text.contains("no active break"));
            }
            other => panic!("Expected Reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_reason_flow_over_ipc() {
        let f = fixture();

        let resp = f.handler.handle(out(7, BreakCategory::Other)).await;
        assert!(matches!(resp, DaemonResponse::Reply { success: false, .. }));
        assert_eq!(f.log.append_count(), 0);

        f.clock.advance(TimeDelta::minutes(1));
        let resp = f
            .handler
            .handle(DaemonMessage::ProvideReason {
                person_id: 7,
                display_name: "Ana".to_string(),
                reason: "bank".to_string(),
                conversation: None,
            })
            .await;
        match resp {
            DaemonResponse::Reply { success, text } => {
                assert!(success);
                assert!(text.contains("Reason: bank"));
            }
            other => panic!("Expected Reply, got {:?}", other),
        }

        let events = f.log.read_day(at(9, 0).date()).await.unwrap();
        assert_eq!(events[0].timestamp, "2026-10-15 09:00:00");
    }

    #[tokio::test]
    async fn test_cancel_without_draft() {
        let f = fixture();
        let resp = f
            .handler
            .handle(DaemonMessage::CancelReason {
                person_id: 3,
                display_name: "Cy".to_string(),
            })
            .await;
        assert!(matches!(resp, DaemonResponse::Reply { success: false, .. }));
    }

    #[tokio::test]
    async fn test_active_and_reconcile() {
        let f = fixture();
        f.handler.handle(out(1, BreakCategory::Smoke)).await;

        match f.handler.handle(DaemonMessage::Active).await {
            DaemonResponse::Sessions { sessions } => {
                assert_eq!(sessions.len(), 1);
                assert_eq!(sessions[0].category, BreakCategory::Smoke);
            }
            other => panic!("Expected Sessions, got {:?}", other),
        }

        match f.handler.handle(DaemonMessage::Reconcile).await {
            DaemonResponse::Recovered { stats } => assert_eq!(stats.orphans_closed, 1),
            other => panic!("Expected Recovered, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_notifications_drain_outbox() {
        let f = fixture();
        f.outbox
            .notify(Notification {
                to: Recipient::Person(1),
                text: "hello".to_string(),
                created_at: at(9, 0),
            })
            .await
            .unwrap();

        match f.handler.handle(DaemonMessage::Notifications).await {
            DaemonResponse::Notifications { items } => assert_eq!(items.len(), 1),
            other => panic!("Expected Notifications, got {:?}", other),
        }
        assert!(f.outbox.is_empty());
    }

    #[tokio::test]
    async fn test_status_counts_sessions_without_sync() {
        let f = fixture();
        f.handler.handle(out(1, BreakCategory::Smoke)).await;
        f.handler.handle(out(2, BreakCategory::Meal)).await;

        match f.handler.handle(DaemonMessage::Status).await {
            DaemonResponse::Status { health } => {
                assert_eq!(health.version, crate::VERSION);
                assert_eq!(health.active_sessions, 2);
                assert!(health.sync.is_none());
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_reports_sync_counters() {
        let log = Arc::new(MemoryEventLog::new());
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let table = SessionTable::new();
        let (sync, _worker) = worker_with_full_queue();
        let tracker = Arc::new(BreakTracker::new(table.clone(), log.clone(), clock.clone()).with_sync(sync.clone()));
        let reconciler = Arc::new(Reconciler::new(log, table, clock.clone(), 3));
        let handler = CommandHandler::new(tracker, reconciler, Arc::new(OutboxNotifier::new(4)), clock)
            .with_sync_monitor(sync.monitor());

        handler.handle(out(1, BreakCategory::Smoke)).await;
        handler.handle(out(2, BreakCategory::Meal)).await;

        match handler.handle(DaemonMessage::Status).await {
            DaemonResponse::Status { health } => {
                let sync = health.sync.unwrap();
                assert_eq!(sync.gateway, "unreachable");
                assert_eq!(sync.phase, BreakerPhase::Closed);
                assert_eq!(sync.breaker, BreakerStats::default());
                assert_eq!(sync.dropped, 1);
            }
            other => panic!("Expected Status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let f = fixture();
        assert_eq!(
            f.handler.handle(DaemonMessage::Ping).await,
            DaemonResponse::Pong {
                version: crate::VERSION.to_string()
            }
        );
    }
}
