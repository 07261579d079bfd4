//! Time-window matching against the weekly schedule.
//!
//! Pure functions: no state, no side effects, callable concurrently.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::error::CoreError;
use crate::schedule::{DayKey, ScheduleItem, WeeklySchedule};

/// Window for the "upcoming" classification on the display board.
const UPCOMING_SECS: i64 = 300;

/// Display board band: 5 minutes back to 1 hour ahead.
const BOARD_LOWER_SECS: i64 = -300;
const BOARD_UPPER_SECS: i64 = 3600;

/// A schedule item that fell inside a match window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedItem {
    /// The matched schedule item.
    #[serde(flatten)]
    pub item: ScheduleItem,
    /// Seconds from now until the item starts. Negative if already started.
    pub seconds_until: i64,
}

/// A schedule item classified for UI display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedItem {
    #[serde(flatten)]
    pub item: ScheduleItem,
    /// Seconds from now until the item starts.
    pub time_diff: i64,
    /// Starts within the next five minutes.
    pub is_upcoming: bool,
    /// Currently in progress.
    pub is_current: bool,
}

/// Parse an "HH:MM" time-of-day string into seconds since midnight.
///
/// Fails fast on anything malformed rather than silently coercing to
/// midnight.
pub fn time_to_seconds(time: &str) -> Result<u32, CoreError> {
    let malformed = || CoreError::MalformedTime(time.to_string());
    let (hours, minutes) = time.split_once(':').ok_or_else(malformed)?;
    let hours: u32 = hours.parse().map_err(|_| malformed())?;
    let minutes: u32 = minutes.parse().map_err(|_| malformed())?;
    if hours > 23 || minutes > 59 {
        return Err(malformed());
    }
    Ok(hours * 3600 + minutes * 60)
}

/// Match today's items whose start falls inside the window.
///
/// The day key is resolved from `now`'s day of week. An item is included
/// iff `lower_bound_secs <= start - now <= window_secs`, both ends
/// inclusive. Source order is preserved.
pub fn match_window(
    schedule: &WeeklySchedule,
    now: NaiveDateTime,
    window_secs: i64,
    lower_bound_secs: i64,
) -> Result<Vec<MatchedItem>, CoreError> {
    let day = DayKey::from_weekday(now.weekday());
    match_day(schedule, day, now, window_secs, lower_bound_secs)
}

/// Match a specific day's items against the window, using `now`'s
/// time of day. Used by client-initiated checks that supply the day.
pub fn match_day(
    schedule: &WeeklySchedule,
    day: DayKey,
    now: NaiveDateTime,
    window_secs: i64,
    lower_bound_secs: i64,
) -> Result<Vec<MatchedItem>, CoreError> {
    let now_secs = i64::from(now.num_seconds_from_midnight());

    let mut matched = Vec::new();
    for item in schedule.items(day) {
        let start_secs = i64::from(time_to_seconds(&item.start)?);
        let diff = start_secs - now_secs;
        if diff >= lower_bound_secs && diff <= window_secs {
            matched.push(MatchedItem {
                item: item.clone(),
                seconds_until: diff,
            });
        }
    }
    Ok(matched)
}

/// Classify today's items for the display board.
///
/// Returns items in the [-300s, +3600s] band around now, each tagged
/// as current and/or upcoming, sorted ascending by time until start.
pub fn upcoming_board(
    schedule: &WeeklySchedule,
    now: NaiveDateTime,
) -> Result<Vec<ClassifiedItem>, CoreError> {
    let day = DayKey::from_weekday(now.weekday());
    let now_secs = i64::from(now.num_seconds_from_midnight());

    let mut board = Vec::new();
    for item in schedule.items(day) {
        let start_secs = i64::from(time_to_seconds(&item.start)?);
        let end_secs = i64::from(time_to_seconds(&item.end)?);
        let diff = start_secs - now_secs;
        if diff < BOARD_LOWER_SECS || diff > BOARD_UPPER_SECS {
            continue;
        }
        board.push(ClassifiedItem {
            item: item.clone(),
            time_diff: diff,
            is_upcoming: diff > 0 && diff <= UPCOMING_SECS,
            is_current: diff <= 0 && end_secs > now_secs,
        });
    }
    board.sort_by_key(|c| c.time_diff);
    Ok(board)
}
