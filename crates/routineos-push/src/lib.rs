//! Push delivery for RoutineOS.
//!
//! This crate owns the durable subscription registry, the push protocol
//! client, and the dispatcher that fans notifications out to registered
//! endpoints and live streaming connections. The `Engine` ties matching,
//! dedup and dispatch into the one shared pipeline that every trigger
//! entry point invokes.

mod client;
mod dispatcher;
mod engine;
mod error;
mod payload;
mod store;
mod subscription;

pub use client::PushClient;
pub use dispatcher::{DeliveryResult, DispatchReport, Dispatcher};
pub use engine::{
    CHECK_WINDOW_SECS, CRON_WINDOW_SECS, DispatchSummary, Engine, STREAM_WINDOW_SECS,
};
pub use error::{DeliveryError, PushError};
pub use payload::NotificationPayload;
pub use store::SubscriptionStore;
pub use subscription::{Subscription, SubscriptionKeys};
