//! Break events as they are written to the event log

use chrono::{NaiveDateTime, ParseResult};
use serde::{Deserialize, Serialize};

use super::{BreakCategory, PersonId};

/// Text format of every stored timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Direction of a break event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Out,
    Back,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Out => write!(f, "OUT"),
            Self::Back => write!(f, "BACK"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "out" | "1" => Ok(Self::Out),
            "back" | "2" => Ok(Self::Back),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

/// Parse a button/command code such as `S1` or `e2` into category and direction
pub fn parse_action_code(code: &str) -> Result<(BreakCategory, EventKind), String> {
    let code = code.trim().trim_start_matches('/');
    let mut chars = code.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(digit), None) => {
            let category = letter.to_string().parse::<BreakCategory>()?;
            let kind = digit.to_string().parse::<EventKind>()?;
            Ok((category, kind))
        }
        _ => Err(format!("Unknown action code: {}", code)),
    }
}

/// One immutable record of the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvent {
    pub person_id: PersonId,
    pub display_name: String,
    pub category: BreakCategory,
    pub kind: EventKind,
    /// Local wall-clock time in [`TIMESTAMP_FORMAT`]
    pub timestamp: String,
    /// Only present on Back events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BreakEvent {
    pub fn out(
        person_id: PersonId,
        display_name: impl Into<String>,
        category: BreakCategory,
        at: NaiveDateTime,
        reason: Option<String>,
    ) -> Self {
        Self {
            person_id,
            display_name: display_name.into(),
            category,
            kind: EventKind::Out,
            timestamp: format_timestamp(at),
            duration_minutes: None,
            reason,
        }
    }

    pub fn back(
        person_id: PersonId,
        display_name: impl Into<String>,
        category: BreakCategory,
        at: NaiveDateTime,
        duration_minutes: f64,
        reason: Option<String>,
    ) -> Self {
        Self {
            person_id,
            display_name: display_name.into(),
            category,
            kind: EventKind::Back,
            timestamp: format_timestamp(at),
            duration_minutes: Some(duration_minutes),
            reason,
        }
    }

    /// Parse the stored timestamp
    pub fn time(&self) -> ParseResult<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

pub fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> ParseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
}

/// Round to one decimal place
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Minutes from `start` to `end`, rounded to 0.1 and never negative
pub fn minutes_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let seconds = (end - start).num_seconds().max(0) as f64;
    round_tenth(seconds / 60.0)
}
