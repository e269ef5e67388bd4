//! Property tests for the session state machine

use std::sync::Arc;

use breaktime::domain::{BreakCategory, EventKind, Requester};
use breaktime::state::{BreakTracker, SessionTable, replay};
use breaktime::store::{EventLog, MemoryEventLog};
use breaktime::{ManualClock, PersonId};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use proptest::prelude::*;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(8, 0, 0).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn category(index: usize) -> BreakCategory {
    [BreakCategory::Meal, BreakCategory::Restroom, BreakCategory::Smoke][index % 3]
}

#[derive(Debug, Clone)]
enum Op {
    Start(PersonId, usize),
    End(PersonId, usize),
    Tick(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..4, 0usize..3).prop_map(|(p, c)| Op::Start(p, c)),
        (1i64..4, 0usize..3).prop_map(|(p, c)| Op::End(p, c)),
        (1i64..30).prop_map(Op::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Concurrent starts for one person: exactly one wins and exactly one Out is written
    #[test]
    fn prop_concurrent_starts_create_one_session(
        categories in prop::collection::vec(0usize..3, 2..16)
    ) {
        let (wins, outs, active) = runtime().block_on(async {
            let log = Arc::new(MemoryEventLog::new());
            let table = SessionTable::new();
            let tracker = Arc::new(BreakTracker::new(table.clone(), log.clone(), Arc::new(ManualClock::new(start()))));

            let tasks: Vec<_> = categories
                .iter()
                .map(|&c| {
                    let tracker = tracker.clone();
                    tokio::spawn(async move {
                        tracker.start_break(&Requester::new(9, "Ana"), category(c), None).await.is_ok()
                    })
                })
                .collect();

            let mut wins = 0;
            for task in tasks {
                if task.await.unwrap() {
                    wins += 1;
                }
            }
            let outs = log
                .read_day(start().date())
                .await
                .unwrap()
                .iter()
                .filter(|e| e.kind == EventKind::Out)
                .count();
            (wins, outs, table.len().await)
        });

        prop_assert_eq!(wins, 1);
        prop_assert_eq!(outs, 1);
        prop_assert_eq!(active, 1);
    }

    /// After any command sequence the log replays to exactly the live sessions
    #[test]
    fn prop_log_replays_to_session_table(ops in prop::collection::vec(op(), 1..40)) {
        let (orphans, anomalies, live) = runtime().block_on(async {
            let log = Arc::new(MemoryEventLog::new());
            let clock = Arc::new(ManualClock::new(start()));
            let table = SessionTable::new();
            let tracker = BreakTracker::new(table.clone(), log.clone(), clock.clone());

            for op in &ops {
                match *op {
                    Op::Start(p, c) => {
                        let _ = tracker.start_break(&Requester::new(p, "P"), category(c), None).await;
                    }
                    Op::End(p, c) => {
                        let _ = tracker.end_break(&Requester::new(p, "P"), category(c)).await;
                    }
                    Op::Tick(secs) => clock.advance(TimeDelta::seconds(secs)),
                }
            }

            let events = log.read_day(start().date()).await.unwrap();
            let replayed = replay(&events);
            let orphans: Vec<_> = replayed.orphans.iter().map(|e| (e.person_id, e.category)).collect();
            let live: Vec<_> = table.snapshot().await.iter().map(|s| (s.person_id, s.category)).collect();
            (orphans, replayed.anomalies.len(), live)
        });

        prop_assert_eq!(anomalies, 0);
        prop_assert_eq!(orphans, live);
    }
}
