//! Events produced to live streaming clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleItem;

/// A structured message pushed over live connections.
///
/// The `type` discriminator and camelCase field names are the wire
/// format consumed by the browser-side background agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Sent to a connection once, immediately after it opens.
    Connected,

    /// A schedule item is about to start.
    #[serde(rename_all = "camelCase")]
    UpcomingTask {
        task: ScheduleItem,
        day_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// A user-armed one-shot timer expired.
    Timer {
        id: String,
        minutes: u64,
        message: String,
    },

    /// Streaming alert with the countdown to an imminent item.
    #[serde(rename_all = "camelCase")]
    TaskAlert {
        time_until: i64,
        task: ScheduleItem,
        start_at: String,
        title: String,
        description: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerEvent {
    /// Wire representation, one JSON object per event.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"connected"}"#.to_string())
    }
}
