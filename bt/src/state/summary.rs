//! Per-day aggregation of break events

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{BreakCategory, BreakEvent, BreakSession, EventKind, PersonId, round_tenth};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub category: BreakCategory,
    /// Completed breaks
    pub count: usize,
    pub total_minutes: f64,
}

/// One person's breaks on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakSummary {
    pub person_id: PersonId,
    pub date: NaiveDate,
    /// Categories with at least one completed break, in category order
    pub categories: Vec<CategoryTotals>,
    /// Sum over categories that count toward the total
    pub total_minutes: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<BreakSession>,
}

impl BreakSummary {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.active.is_none()
    }
}

/// Aggregate the completed breaks of `person` from one day's events
pub fn summarize_events(person: PersonId, date: NaiveDate, events: &[BreakEvent]) -> BreakSummary {
    let mut totals: BTreeMap<BreakCategory, (usize, f64)> = BTreeMap::new();

    for event in events.iter().filter(|e| e.person_id == person && e.kind == EventKind::Back) {
        let entry = totals.entry(event.category).or_default();
        entry.0 += 1;
        entry.1 += event.duration_minutes.unwrap_or(0.0);
    }

    let total_minutes = round_tenth(
        totals
            .iter()
            .filter(|(category, _)| category.counts_toward_total())
            .map(|(_, (_, minutes))| minutes)
            .sum(),
    );

    BreakSummary {
        person_id: person,
        date,
        categories: totals
            .into_iter()
            .map(|(category, (count, minutes))| CategoryTotals {
                category,
                count,
                total_minutes: round_tenth(minutes),
            })
            .collect(),
        total_minutes,
        active: None,
    }
}

/// People who appear in a day's events, with the last display name seen
pub fn people(events: &[BreakEvent]) -> BTreeMap<PersonId, String> {
    events
        .iter()
        .map(|e| (e.person_id, e.display_name.clone()))
        .collect()
}

/// Outs that never got their Back on the same day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingBack {
    pub person_id: PersonId,
    pub display_name: String,
    pub category: BreakCategory,
    pub outs: usize,
    pub backs: usize,
}

impl MissingBack {
    pub fn missing(&self) -> usize {
        self.outs - self.backs
    }
}

/// Every (person, category) with more Outs than Backs in `events`
pub fn missing_backs(events: &[BreakEvent]) -> Vec<MissingBack> {
    let mut counts: BTreeMap<(PersonId, BreakCategory), (String, usize, usize)> = BTreeMap::new();

    for event in events {
        let entry = counts
            .entry((event.person_id, event.category))
            .or_insert_with(|| (event.display_name.clone(), 0, 0));
        entry.0 = event.display_name.clone();
        match event.kind {
            EventKind::Out => entry.1 += 1,
            EventKind::Back => entry.2 += 1,
        }
    }

    counts
        .into_iter()
        .filter(|(_, (_, outs, backs))| outs > backs)
        .map(|((person_id, category), (display_name, outs, backs))| MissingBack {
            person_id,
            display_name,
            category,
            outs,
            backs,
        })
        .collect()
}
