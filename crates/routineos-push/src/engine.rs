//! The shared match/dedup/dispatch pipeline.
//!
//! Every trigger surface (periodic cron, client-initiated check, the
//! streaming alert loop) is a thin entry point into this one engine with
//! its own window parameters; none of them duplicates matching or dedup
//! logic.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::Serialize;
use tracing::debug;

use routineos_core::{
    BroadcastHub, CoreError, DayKey, DedupStore, MatchedItem, ScheduleItem, ServerEvent,
    WeeklySchedule, matcher,
};

use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::payload::NotificationPayload;

/// Window for the periodic push trigger.
pub const CRON_WINDOW_SECS: i64 = 60;
/// Window for client-initiated checks.
pub const CHECK_WINDOW_SECS: i64 = 300;
/// Window for the streaming alert loop.
pub const STREAM_WINDOW_SECS: i64 = 120;

/// Per-invocation summary: the occurrence state transitions plus the
/// full delivery report for items that survived dedup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    /// Items inside the window.
    pub matched: usize,
    /// Matched items suppressed by the dedup store.
    pub suppressed: usize,
    /// Matched items actually handed to the dispatcher.
    pub notified_tasks: usize,
    #[serde(flatten)]
    pub report: DispatchReport,
}

/// The notification dispatch engine.
///
/// All state is explicit instance state injected at construction, built
/// once at process start and shared by every entry point.
pub struct Engine {
    schedule: Arc<WeeklySchedule>,
    dedup: Arc<DedupStore>,
    dispatcher: Arc<Dispatcher>,
    hub: Arc<BroadcastHub>,
}

impl Engine {
    pub fn new(
        schedule: Arc<WeeklySchedule>,
        dedup: Arc<DedupStore>,
        dispatcher: Arc<Dispatcher>,
        hub: Arc<BroadcastHub>,
    ) -> Self {
        Self {
            schedule,
            dedup,
            dispatcher,
            hub,
        }
    }

    /// Periodic trigger path: match today against a look-ahead window
    /// and dispatch the deduplicated survivors.
    pub async fn run_push_window(
        &self,
        now: DateTime<Local>,
        window_secs: i64,
    ) -> Result<DispatchSummary, CoreError> {
        let day = DayKey::from_weekday(now.naive_local().weekday());
        let (summary, _) = self.run_window(now, day, window_secs, 0).await?;
        Ok(summary)
    }

    /// Client-initiated check against a caller-supplied day, with the
    /// 5 minute window.
    pub async fn run_client_check(
        &self,
        now: DateTime<Local>,
        day_index: usize,
    ) -> Result<DispatchSummary, CoreError> {
        let day = DayKey::from_index(day_index)?;
        let (summary, _) = self.run_window(now, day, CHECK_WINDOW_SECS, 0).await?;
        Ok(summary)
    }

    /// One tick of the streaming alert loop: 2 minute look-ahead,
    /// exclusive of items starting right now, plus a task-alert event
    /// carrying the countdown for every dispatched item.
    pub async fn run_stream_tick(
        &self,
        now: DateTime<Local>,
    ) -> Result<DispatchSummary, CoreError> {
        let day = DayKey::from_weekday(now.naive_local().weekday());
        let (summary, dispatched) = self.run_window(now, day, STREAM_WINDOW_SECS, 1).await?;

        for matched in &dispatched {
            self.hub.broadcast(&ServerEvent::TaskAlert {
                time_until: matched.seconds_until,
                task: matched.item.clone(),
                start_at: matched.item.start.clone(),
                title: matched.item.task.clone(),
                description: matched.item.description.clone(),
                timestamp: now.to_utc(),
            });
        }
        Ok(summary)
    }

    /// Ad-hoc manual notification with a caller-supplied payload.
    ///
    /// Bypasses matching and dedup entirely; delivery and dead-endpoint
    /// pruning work exactly as on the scheduled paths.
    pub async fn run_manual(
        &self,
        payload: &NotificationPayload,
        endpoint_contains: Option<&str>,
    ) -> DispatchReport {
        self.dispatcher.dispatch_manual(payload, endpoint_contains).await
    }

    async fn run_window(
        &self,
        now: DateTime<Local>,
        day: DayKey,
        window_secs: i64,
        lower_bound_secs: i64,
    ) -> Result<(DispatchSummary, Vec<MatchedItem>), CoreError> {
        let local = now.naive_local();
        let matched = matcher::match_day(&self.schedule, day, local, window_secs, lower_bound_secs)?;
        let now_utc = now.to_utc();

        let mut survivors = Vec::new();
        let mut suppressed = 0;
        for item in &matched {
            let key = occurrence_key(local.date(), day, &item.item);
            if self.dedup.should_notify(&key, now_utc) {
                survivors.push(item.clone());
            } else {
                suppressed += 1;
            }
        }
        debug!(
            day = %day,
            window_secs,
            matched = matched.len(),
            suppressed,
            "window evaluated"
        );

        let report = self.dispatcher.dispatch(&survivors, day, now_utc).await;
        let summary = DispatchSummary {
            matched: matched.len(),
            suppressed,
            notified_tasks: survivors.len(),
            report,
        };
        Ok((summary, survivors))
    }
}

/// Identity of one concrete occurrence: date, day index, start, label.
fn occurrence_key(date: NaiveDate, day: DayKey, item: &ScheduleItem) -> String {
    format!(
        "{}-{}-{}-{}-{}-{}",
        date.year(),
        date.month(),
        date.day(),
        day.index(),
        item.start,
        item.task,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurrence_key_shape() {
        let item = ScheduleItem {
            start: "08:00".to_string(),
            end: "08:30".to_string(),
            task: "Standup".to_string(),
            description: String::new(),
        };
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        assert_eq!(
            occurrence_key(date, DayKey::Monday, &item),
            "2025-1-6-1-08:00-Standup"
        );
    }

    #[test]
    fn test_occurrence_keys_distinguish_items() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let a = ScheduleItem {
            start: "08:00".to_string(),
            end: "08:30".to_string(),
            task: "Standup".to_string(),
            description: String::new(),
        };
        let mut b = a.clone();
        b.task = "Review".to_string();
        assert_ne!(
            occurrence_key(date, DayKey::Monday, &a),
            occurrence_key(date, DayKey::Monday, &b)
        );
    }
}
