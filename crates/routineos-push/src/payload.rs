//! Push notification payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use routineos_core::{DayKey, ScheduleItem};

/// The JSON object delivered through the push protocol.
///
/// Opaque to the push provider; the browser-side background agent reads
/// the `data` blob for day and item context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
    /// Epoch milliseconds at dispatch time.
    pub timestamp: i64,
}

impl NotificationPayload {
    /// Compose the payload for one matched schedule item.
    pub fn for_item(item: &ScheduleItem, day: DayKey, now: DateTime<Utc>) -> Self {
        Self {
            title: "Time to start your routine!".to_string(),
            body: format!("{} - {}\n\n{}", item.start, item.task, item.description),
            data: json!({ "dayKey": day, "task": item }),
            timestamp: now.timestamp_millis(),
        }
    }

    /// Compose an ad-hoc payload from caller-supplied fields.
    pub fn custom(title: String, body: String, data: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            title,
            body,
            data,
            timestamp: now.timestamp_millis(),
        }
    }
}
