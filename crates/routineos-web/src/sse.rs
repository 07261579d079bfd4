//! Server-Sent Events adaptation of a hub connection.

use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use routineos_core::{BroadcastHub, Connection};

/// Deregisters the hub connection when the SSE stream is dropped.
struct DisconnectOnDrop {
    id: Uuid,
    hub: Arc<BroadcastHub>,
}

impl Drop for DisconnectOnDrop {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}

/// Turn a hub connection into an SSE response stream.
///
/// The connection-established event queued by `connect` is the first
/// event the client sees.
pub fn create_sse_stream(
    connection: Connection,
    hub: Arc<BroadcastHub>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let guard = DisconnectOnDrop {
        id: connection.id,
        hub,
    };
    let stream = UnboundedReceiverStream::new(connection.events).map(move |event| {
        let _keep_alive = &guard;
        Ok(Event::default().data(event.to_json()))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
