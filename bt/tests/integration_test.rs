//! Integration tests for BreakTime
//!
//! These tests wire the real components together over an on-disk event log.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use breaktime::domain::{BreakCategory, BreakEvent, EventKind, Requester};
use breaktime::ipc::{CommandHandler, DaemonClient, listener};
use breaktime::notify::{ChannelNotifier, OutboxNotifier};
use breaktime::scheduler::{DailyReport, ReminderScheduler};
use breaktime::state::{BreakError, BreakTracker, Reconciler, SessionTable};
use breaktime::store::{EventLog, JsonlEventLog};
use breaktime::sync::{BreakerConfig, CircuitBreaker, SyncError, SyncGateway, SyncWorker};
use breaktime::watcher::{ResetWatcher, request_reset};
use breaktime::{ManualClock, config::ReminderConfig};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tempfile::TempDir;
use tokio::sync::{Mutex, watch};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 15).expect("valid date")
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, s).expect("valid time")
}

struct World {
    temp: TempDir,
    log: Arc<JsonlEventLog>,
    clock: Arc<ManualClock>,
    table: SessionTable,
    tracker: Arc<BreakTracker>,
    reconciler: Arc<Reconciler>,
}

fn world(now: NaiveDateTime) -> World {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let log = Arc::new(JsonlEventLog::open(temp.path().join("database"), "break_logs").expect("open log"));
    let clock = Arc::new(ManualClock::new(now));
    let table = SessionTable::new();
    let tracker = Arc::new(BreakTracker::new(table.clone(), log.clone(), clock.clone()));
    let reconciler = Arc::new(Reconciler::new(log.clone(), table.clone(), clock.clone(), 3));
    World {
        temp,
        log,
        clock,
        table,
        tracker,
        reconciler,
    }
}

// =============================================================================
// State machine over the JSONL store
// =============================================================================

#[tokio::test]
async fn test_meal_round_trip_on_disk() {
    let w = world(at(9, 0, 0));
    let ana = Requester::new(42, "Ana");

    w.tracker.start_break(&ana, BreakCategory::Meal, None).await.unwrap();
    w.clock.set(at(9, 18, 30));
    let ended = w.tracker.end_break(&ana, BreakCategory::Meal).await.unwrap();
    assert_eq!(ended.duration_minutes, 18.5);

    let events = w.log.read_day(day()).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Out);
    assert_eq!(events[1].kind, EventKind::Back);
    assert_eq!(events[1].category, BreakCategory::Meal);
    assert_eq!(events[1].duration_minutes, Some(18.5));
    assert_eq!(events[1].reason, None);

    let partition = w
        .temp
        .path()
        .join("database")
        .join("2026-10")
        .join("break_logs_2026-10-15.jsonl");
    assert!(partition.exists(), "partition file should be written");
}

#[tokio::test]
async fn test_mismatch_leaves_session_intact() {
    let w = world(at(10, 0, 0));
    let ana = Requester::new(1, "Ana");

    w.tracker.start_break(&ana, BreakCategory::Smoke, None).await.unwrap();
    let err = w.tracker.end_break(&ana, BreakCategory::Meal).await.unwrap_err();
    assert!(matches!(err, BreakError::CategoryMismatch { .. }));
    assert!(w.table.is_active(1).await);

    w.clock.advance(TimeDelta::minutes(5));
    let ended = w.tracker.end_break(&ana, BreakCategory::Smoke).await.unwrap();
    assert_eq!(ended.duration_minutes, 5.0);
}

#[tokio::test]
async fn test_other_reason_keeps_original_start() {
    let w = world(at(11, 0, 0));
    let ben = Requester::new(7, "Ben");

    let err = w.tracker.start_break(&ben, BreakCategory::Other, None).await.unwrap_err();
    assert!(matches!(err, BreakError::ReasonRequired { .. }));
    assert!(!w.table.is_active(7).await);
    assert!(w.log.read_day(day()).await.unwrap().is_empty());

    w.clock.set(at(11, 2, 0));
    let started = w.tracker.provide_reason(&ben, "bank errand".to_string()).await.unwrap();
    assert_eq!(started.started_at, at(11, 0, 0));

    let events = w.log.read_day(day()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].timestamp, "2026-10-15 11:00:00");
    assert_eq!(events[0].reason.as_deref(), Some("bank errand"));
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn test_restart_reconciliation_is_idempotent() {
    let w = world(at(8, 30, 0));
    let yesterday = day().pred_opt().unwrap();
    let orphan = BreakEvent::out(5, "Cy", BreakCategory::Smoke, yesterday.and_hms_opt(17, 0, 0).unwrap(), None);
    w.log.append(yesterday, &orphan).await.unwrap();

    let first = w.reconciler.run().await;
    assert_eq!(first.orphans_closed, 1);
    let second = w.reconciler.run().await;
    assert_eq!(second.orphans_closed, 0);

    let today = w.log.read_day(day()).await.unwrap();
    assert_eq!(today.len(), 1);
    assert_eq!(today[0].kind, EventKind::Back);
    assert_eq!(today[0].duration_minutes, Some(930.0));
    assert_eq!(today[0].reason.as_deref(), Some("auto-closed, originated 2026-10-14"));

    // The original partition is never rewritten
    assert_eq!(w.log.read_day(yesterday).await.unwrap(), vec![orphan]);
}

#[tokio::test]
async fn test_admin_reset_via_flag_file() {
    let w = world(at(12, 0, 0));
    w.tracker
        .start_break(&Requester::new(1, "Ana"), BreakCategory::Meal, None)
        .await
        .unwrap();

    let flag = w.temp.path().join("reset.flag");
    let watcher = ResetWatcher::new(flag.clone(), Duration::from_millis(10), w.reconciler.clone());
    request_reset(&flag).unwrap();

    let stats = watcher.check_once().await.expect("flag should be consumed");
    assert_eq!(stats.orphans_closed, 1);
    assert!(w.table.is_empty().await);
    assert!(!flag.exists());
}

// =============================================================================
// Background loops
// =============================================================================

#[tokio::test]
async fn test_reminder_sent_once_across_many_ticks() {
    let w = world(at(9, 0, 0));
    w.tracker
        .start_break(&Requester::new(3, "Dee").in_conversation(-77), BreakCategory::Smoke, None)
        .await
        .unwrap();

    let (notifier, mut rx) = ChannelNotifier::new();
    let scheduler = ReminderScheduler::new(
        w.table.clone(),
        Arc::new(notifier),
        w.clock.clone(),
        ReminderConfig::default(),
    );

    let mut sent = 0;
    for minute in 0..40 {
        w.clock.set(at(9, 0, 0) + TimeDelta::minutes(minute));
        sent += scheduler.tick().await;
    }
    assert_eq!(sent, 1);

    let note = rx.recv().await.unwrap();
    assert_eq!(note.to, breaktime::Recipient::Conversation(-77));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_daily_report_flags_missing_backs() {
    let w = world(at(9, 0, 0));
    let ana = Requester::new(1, "Ana");
    w.tracker.start_break(&ana, BreakCategory::Meal, None).await.unwrap();
    w.clock.set(at(9, 30, 0));
    w.tracker.end_break(&ana, BreakCategory::Meal).await.unwrap();
    w.tracker
        .start_break(&Requester::new(2, "Ben"), BreakCategory::Smoke, None)
        .await
        .unwrap();

    let outbox = Arc::new(OutboxNotifier::new(16));
    let report = DailyReport::new(w.log.clone(), outbox.clone(), w.clock.clone(), true);
    let stats = report.run_for(day()).await;

    assert_eq!(stats.people, 2);
    assert_eq!(stats.missing_backs, 1);
    assert!(!outbox.is_empty());
}

// =============================================================================
// Sync through the circuit breaker
// =============================================================================

#[derive(Default)]
struct FlakyGateway {
    calls: AtomicUsize,
    pushed: Mutex<Vec<BreakEvent>>,
    failing: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl SyncGateway for FlakyGateway {
    async fn push(&self, event: &BreakEvent) -> Result<(), SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::ApiError {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        self.pushed.lock().await.push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn test_sync_failures_never_reach_the_caller() {
    let w = world(at(9, 0, 0));
    let gateway = Arc::new(FlakyGateway::default());
    gateway.failing.store(true, Ordering::SeqCst);
    let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
    let (handle, join) = SyncWorker::spawn(gateway.clone(), breaker.clone(), 64);

    let tracker = BreakTracker::new(w.table.clone(), w.log.clone(), w.clock.clone()).with_sync(handle.clone());
    for person in 1..=5 {
        let who = Requester::new(person, format!("P{}", person));
        tracker.start_break(&who, BreakCategory::Restroom, None).await.unwrap();
    }
    drop(tracker);
    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), join).await.unwrap().unwrap();

    let stats = breaker.stats();
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 3);
    assert_eq!(stats.trips, 1);
    assert_eq!(stats.short_circuited, 2);
    assert_eq!(w.log.read_day(day()).await.unwrap().len(), 5);
}

// =============================================================================
// IPC end to end
// =============================================================================

#[tokio::test]
async fn test_ipc_break_flow() {
    let w = world(at(9, 0, 0));
    let socket_path = w.temp.path().join("daemon.sock");
    let (ipc_listener, _) = listener::create_listener_at(&socket_path).unwrap();
    let handler = Arc::new(CommandHandler::new(
        w.tracker.clone(),
        w.reconciler.clone(),
        Arc::new(OutboxNotifier::new(8)),
        w.clock.clone(),
    ));
    let (tx, _rx) = watch::channel(false);
    let server = tokio::spawn(listener::serve(ipc_listener, handler, tx));

    let client = DaemonClient::with_socket_path(socket_path);
    let ana = Requester::new(42, "Ana");

    let reply = client
        .break_action(&ana, EventKind::Out, BreakCategory::Meal, None)
        .await
        .unwrap();
    assert!(reply.success, "{}", reply.text);

    let again = client
        .break_action(&ana, EventKind::Out, BreakCategory::Smoke, None)
        .await
        .unwrap();
    assert!(!again.success);
    assert!(again.text.contains("already on Eating"));

    w.clock.set(at(9, 18, 30));
    let back = client
        .break_action(&ana, EventKind::Back, BreakCategory::Meal, None)
        .await
        .unwrap();
    assert!(back.text.contains("18.5 minutes"));

    let summary = client.summary(42, "Ana", None).await.unwrap();
    assert!(summary.text.contains("Total: 18.5 minutes"));

    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}
