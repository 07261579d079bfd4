//! One-shot timer service.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::ServerEvent;
use crate::hub::BroadcastHub;

/// Arms arbitrary future broadcasts, one firing per timer.
///
/// Timers live only in this process; they do not survive a restart.
pub struct TimerService {
    hub: Arc<BroadcastHub>,
    pending: Arc<DashMap<String, oneshot::Sender<()>>>,
}

impl TimerService {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        Self {
            hub,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Arm a timer that broadcasts a timer event after `minutes`.
    ///
    /// Whoever removes the pending entry first, the firing task or a
    /// cancel call, owns the outcome; the firing task only broadcasts
    /// when it wins that removal, so a timer fires at most once.
    pub fn schedule(&self, minutes: u64, message: String) -> String {
        let id = format!("tmr-{}", Uuid::new_v4());
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.pending.insert(id.clone(), cancel_tx);

        let hub = self.hub.clone();
        let pending = self.pending.clone();
        let timer_id = id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sleep(Duration::from_secs(minutes.saturating_mul(60))) => {
                    if pending.remove(&timer_id).is_some() {
                        let delivered = hub.broadcast(&ServerEvent::Timer {
                            id: timer_id.clone(),
                            minutes,
                            message,
                        });
                        info!(id = %timer_id, delivered, "timer fired");
                    }
                }
                _ = cancel_rx => {
                    debug!(id = %timer_id, "timer cancelled before firing");
                }
            }
        });

        info!(id = %id, minutes, "timer armed");
        id
    }

    /// Cancel a pending timer.
    ///
    /// An unknown or already-fired id is a silent no-op; callers cannot
    /// distinguish the two cases.
    pub fn cancel(&self, id: &str) {
        if let Some((_, cancel_tx)) = self.pending.remove(id) {
            let _ = cancel_tx.send(());
        }
    }

    /// Number of timers that have not yet fired or been cancelled.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
