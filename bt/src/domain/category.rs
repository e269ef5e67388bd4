//! Break categories

use serde::{Deserialize, Serialize};

/// Kind of break a person can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakCategory {
    Meal,
    Restroom,
    Smoke,
    Other,
}

impl BreakCategory {
    pub const ALL: [BreakCategory; 4] = [Self::Meal, Self::Restroom, Self::Smoke, Self::Other];

    /// Human-readable label used in messages and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Meal => "Eating",
            Self::Restroom => "Comfort Room",
            Self::Smoke => "Smoke Break",
            Self::Other => "Other Concern",
        }
    }

    /// One-letter code used by the chat buttons (E1, C2, ...)
    pub fn code(&self) -> char {
        match self {
            Self::Meal => 'E',
            Self::Restroom => 'C',
            Self::Smoke => 'S',
            Self::Other => 'O',
        }
    }

    /// Reminder threshold in minutes when no configuration overrides it
    pub fn default_reminder_minutes(&self) -> Option<u32> {
        match self {
            Self::Meal => Some(60),
            Self::Smoke => Some(15),
            Self::Restroom | Self::Other => None,
        }
    }

    /// Whether durations of this category count toward the daily total
    pub fn counts_toward_total(&self) -> bool {
        !matches!(self, Self::Restroom)
    }

    /// Whether starting this category needs a free-text reason
    pub fn requires_reason(&self) -> bool {
        matches!(self, Self::Other)
    }
}

impl std::fmt::Display for BreakCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Meal => write!(f, "meal"),
            Self::Restroom => write!(f, "restroom"),
            Self::Smoke => write!(f, "smoke"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for BreakCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "meal" | "eat" | "eating" | "e" => Ok(Self::Meal),
            "restroom" | "comfort-room" | "cr" | "c" => Ok(Self::Restroom),
            "smoke" | "s" => Ok(Self::Smoke),
            "other" | "o" => Ok(Self::Other),
            _ => Err(format!("Unknown break category: {}", s)),
        }
    }
}
