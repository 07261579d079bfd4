//! HTTP trigger surface for RoutineOS.
//!
//! Exposes the dispatch engine to external triggers:
//! - Authenticated and unauthenticated periodic push triggers
//! - Client-initiated checks
//! - SSE streaming connections and the per-second alert loop
//! - Subscription registration and timer requests

mod error;
mod routes;
mod sse;
mod watcher;

pub use error::WebError;
pub use routes::{AppState, create_router};
pub use watcher::run_stream_alerts;
