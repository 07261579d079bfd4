//! Streaming alert loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use routineos_push::Engine;

/// Run the per-second streaming alert check until the task is dropped.
///
/// Each tick is one engine invocation with the streaming window; an
/// error on one tick is logged and does not stop the loop.
pub async fn run_stream_alerts(engine: Arc<Engine>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match engine.run_stream_tick(Local::now()).await {
            Ok(summary) if summary.notified_tasks > 0 => {
                debug!(
                    notified = summary.notified_tasks,
                    suppressed = summary.suppressed,
                    "streaming alerts dispatched"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "stream tick failed");
            }
        }
    }
}
