//! Plain-text renderings of outcomes, reminders and summaries

use chrono::NaiveDateTime;

use crate::domain::{BreakSession, TIMESTAMP_FORMAT};
use crate::state::{BreakEnded, BreakError, BreakStarted, BreakSummary, MissingBack, RecoveryStats};

fn clock(at: NaiveDateTime) -> String {
    at.format("%H:%M:%S").to_string()
}

fn minutes(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

pub fn started(name: &str, started: &BreakStarted) -> String {
    let mut text = format!(
        "{} started {} at {}",
        name,
        started.category.label(),
        started.started_at.format(TIMESTAMP_FORMAT)
    );
    if let Some(reason) = &started.reason {
        text.push_str(&format!("\nReason: {}", reason));
    }
    text
}

pub fn ended(name: &str, ended: &BreakEnded) -> String {
    let mut text = format!(
        "{} is back from {}\nStart: {}\nBack: {}\nDuration: {} minutes",
        name,
        ended.category.label(),
        clock(ended.started_at),
        clock(ended.ended_at),
        minutes(ended.duration_minutes)
    );
    if let Some(reason) = &ended.reason {
        text.push_str(&format!("\nReason: {}", reason));
    }
    text
}

pub fn error(name: &str, error: &BreakError) -> String {
    match error {
        BreakError::AlreadyActive { category, started_at } => format!(
            "{}, you are already on {} since {}. End it before starting another break.",
            name,
            category.label(),
            clock(*started_at)
        ),
        BreakError::ReasonRequired { category, .. } => format!(
            "{}, please reply with the reason for your {} break.",
            name,
            category.label()
        ),
        BreakError::NoActiveBreak => format!("{}, you have no active break.", name),
        BreakError::CategoryMismatch { active, requested } => format!(
            "{}, you are on {}, not {}. End {} first.",
            name,
            active.label(),
            requested.label(),
            active.label()
        ),
        BreakError::NoPendingReason => format!("{}, there is no break waiting for a reason.", name),
        BreakError::Storage(_) => format!("{}, your break was NOT recorded. Please try again.", name),
    }
}

pub fn reminder(session: &BreakSession, elapsed_minutes: f64, limit_minutes: u32) -> String {
    format!(
        "Reminder: {}, you have been on your {} for {} minutes (limit: {} minutes).",
        session.display_name,
        session.category.label(),
        minutes(elapsed_minutes.floor()),
        limit_minutes
    )
}

pub fn summary(name: &str, summary: &BreakSummary) -> String {
    let mut lines = vec![format!("Break summary for {} on {}", name, summary.date)];
    if summary.categories.is_empty() {
        lines.push("No completed breaks.".to_string());
    }
    for totals in &summary.categories {
        let note = if totals.category.counts_toward_total() {
            ""
        } else {
            " (not counted)"
        };
        lines.push(format!(
            "{}: {}x, {} minutes{}",
            totals.category.label(),
            totals.count,
            minutes(totals.total_minutes),
            note
        ));
    }
    lines.push(format!("Total: {} minutes", minutes(summary.total_minutes)));
    if let Some(active) = &summary.active {
        lines.push(format!(
            "Currently on {} since {}",
            active.category.label(),
            clock(active.started_at)
        ));
    }
    lines.join("\n")
}

pub fn missing_back(entry: &MissingBack) -> String {
    format!(
        "{} ({}) has {} {} without BACK ({} OUT, {} BACK)",
        entry.display_name,
        entry.person_id,
        entry.missing(),
        entry.category.label(),
        entry.outs,
        entry.backs
    )
}

pub fn recovery(stats: &RecoveryStats) -> String {
    format!("Reconciliation finished: {}", stats)
}

pub fn session_line(session: &BreakSession, now: NaiveDateTime) -> String {
    format!(
        "{:>12}  {:<20} {:<14} since {} ({} min)",
        session.person_id,
        session.display_name,
        session.category.label(),
        clock(session.started_at),
        minutes(session.elapsed_minutes(now).floor())
    )
}
