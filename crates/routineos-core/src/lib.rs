//! Core notification engine for RoutineOS.
//!
//! This crate provides the stateful building blocks that the dispatch
//! pipeline is assembled from:
//! - Matching schedule items against a time window
//! - Deduplicating repeat triggers for the same occurrence
//! - Fanning events out to live streaming connections
//! - One-shot timers with cancellation

mod dedup;
mod error;
mod event;
mod hub;
pub mod matcher;
mod schedule;
mod timer;

pub use dedup::DedupStore;
pub use error::CoreError;
pub use event::ServerEvent;
pub use hub::{BroadcastHub, Connection};
pub use matcher::{ClassifiedItem, MatchedItem};
pub use schedule::{DayKey, ScheduleItem, WeeklySchedule};
pub use timer::TimerService;
