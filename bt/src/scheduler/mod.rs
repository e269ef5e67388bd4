//! Background jobs
//!
//! The reminder scheduler polls the session table on a fixed interval; the
//! daily report runs once after local midnight for the day that just ended.
//! Both stop when the shutdown signal flips.

mod reminder;
mod report;

pub use reminder::ReminderScheduler;
pub use report::{DailyReport, ReportStats, until_next_run};
