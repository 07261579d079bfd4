//! Weekly schedule types.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::matcher::time_to_seconds;

/// Day of week, Sunday-first to match the external schedule source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKey {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayKey {
    /// All days, Sunday-first.
    pub const ALL: [DayKey; 7] = [
        DayKey::Sunday,
        DayKey::Monday,
        DayKey::Tuesday,
        DayKey::Wednesday,
        DayKey::Thursday,
        DayKey::Friday,
        DayKey::Saturday,
    ];

    /// Look up a day by its Sunday-first index.
    pub fn from_index(index: usize) -> Result<DayKey, CoreError> {
        Self::ALL
            .get(index)
            .copied()
            .ok_or(CoreError::InvalidDayIndex(index))
    }

    /// Resolve the day key for a chrono weekday.
    pub fn from_weekday(weekday: Weekday) -> DayKey {
        Self::ALL[weekday.num_days_from_sunday() as usize]
    }

    /// Sunday-first index (0..=6).
    pub fn index(self) -> usize {
        self as usize
    }

    /// Lowercase day name as used in the schedule source.
    pub fn as_str(self) -> &'static str {
        match self {
            DayKey::Sunday => "sunday",
            DayKey::Monday => "monday",
            DayKey::Tuesday => "tuesday",
            DayKey::Wednesday => "wednesday",
            DayKey::Thursday => "thursday",
            DayKey::Friday => "friday",
            DayKey::Saturday => "saturday",
        }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled routine item. Immutable, sourced externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleItem {
    /// Start time of day, "HH:MM".
    pub start: String,
    /// End time of day, "HH:MM".
    pub end: String,
    /// Short task label.
    pub task: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// The weekly schedule: day key to ordered items.
///
/// Read-only to this crate; owned and versioned by the external
/// schedule source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklySchedule(HashMap<DayKey, Vec<ScheduleItem>>);

impl WeeklySchedule {
    /// Items for a day, empty if the day is missing from the source.
    pub fn items(&self, day: DayKey) -> &[ScheduleItem] {
        self.0.get(&day).map(Vec::as_slice).unwrap_or_default()
    }

    /// Total item count across all days.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Whether the schedule has no items at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load and validate a schedule from a JSON file.
    ///
    /// Malformed start/end times are rejected here so that match calls
    /// against a loaded schedule cannot fail on bad data later.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        let schedule: WeeklySchedule = serde_json::from_str(&raw)?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Check that every item's times parse.
    pub fn validate(&self) -> Result<(), CoreError> {
        for items in self.0.values() {
            for item in items {
                time_to_seconds(&item.start)?;
                time_to_seconds(&item.end)?;
            }
        }
        Ok(())
    }

    /// Build a schedule from explicit day entries (mainly for tests).
    pub fn from_days(days: impl IntoIterator<Item = (DayKey, Vec<ScheduleItem>)>) -> Self {
        Self(days.into_iter().collect())
    }
}
