//! Realtime broadcast hub for live streaming connections.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::event::ServerEvent;

/// One open streaming session, owned by the hub for its lifetime.
pub struct Connection {
    /// Opaque connection identity, used to disconnect.
    pub id: Uuid,
    /// Events broadcast while the connection is registered.
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Holds the set of currently-open streaming connections and pushes
/// events to all of them.
///
/// Best-effort only: a connection whose send fails is presumed closed
/// and silently removed. No buffering, no retry.
#[derive(Default)]
pub struct BroadcastHub {
    connections: DashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection.
    ///
    /// The connection-established event is delivered to this connection
    /// only, before any subsequent broadcast.
    pub fn connect(&self) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        // Receiver is live and unbounded, the send cannot fail here.
        let _ = tx.send(ServerEvent::Connected);
        self.connections.insert(id, tx);
        debug!(%id, total = self.connections.len(), "streaming client connected");
        Connection { id, events: rx }
    }

    /// Remove a connection. Idempotent.
    pub fn disconnect(&self, id: Uuid) {
        if self.connections.remove(&id).is_some() {
            debug!(%id, remaining = self.connections.len(), "streaming client disconnected");
        }
    }

    /// Send an event to every registered connection.
    ///
    /// Returns how many connections received it. Connections whose send
    /// fails are removed without affecting delivery to the others.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.connections.remove(&id);
            debug!(%id, "dropped closed streaming connection");
        }
        delivered
    }

    /// Number of currently registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
