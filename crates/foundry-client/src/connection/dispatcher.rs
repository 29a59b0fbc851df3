//! Per-socket inbound dispatcher
//!
//! One task per socket reads its [`SocketEvent`]s in arrival order:
//!
//! - the Engine.IO handshake is answered with [`CONNECT_FRAME`] and goes no further;
//! - every other frame is offered to the pending-request registry;
//! - errors are logged and the socket stays in use;
//! - the close is reported to the supervisor, which decides whether to reconnect.

use std::sync::{Arc, Weak};

use foundry_wire::{CONNECT_FRAME, is_handshake, is_session_event};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{OpenedSocket, SocketEvent, SocketHandle};
use crate::FRAME_LOG_TARGET;
use crate::correlator::PendingRegistry;
use crate::supervisor::Supervisor;

/// Spawns the dispatcher and returns the socket's handle.
pub(crate) fn spawn(
    opened: OpenedSocket,
    registry: Arc<PendingRegistry>,
    supervisor: Weak<Supervisor>,
) -> SocketHandle {
    let OpenedSocket { handle, events } = opened;
    tokio::spawn(run(handle.clone(), events, registry, supervisor));
    handle
}

async fn run(
    handle: SocketHandle,
    mut events: mpsc::UnboundedReceiver<SocketEvent>,
    registry: Arc<PendingRegistry>,
    supervisor: Weak<Supervisor>,
) {
    let socket_id = handle.id();
    debug!("Dispatcher started for socket {}", socket_id);

    let (code, reason) = loop {
        match events.recv().await {
            Some(SocketEvent::Frame(text)) => route_frame(&handle, &registry, &text),
            Some(SocketEvent::Error(e)) => warn!("WebSocket error on socket {}: {}", socket_id, e),
            Some(SocketEvent::Closed { code, reason }) => break (code, reason),
            None => break (None, String::from("event stream ended")),
        }
    };

    handle.mark_closed();
    info!(
        "WebSocket closed: {} - {} (socket {})",
        code.map_or_else(|| "no code".to_string(), |c| c.to_string()),
        reason,
        socket_id
    );

    if let Some(supervisor) = supervisor.upgrade() {
        supervisor.handle_close(socket_id).await;
    }
}

fn route_frame(handle: &SocketHandle, registry: &PendingRegistry, text: &str) {
    debug!(target: FRAME_LOG_TARGET, direction = "inbound", socket = handle.id(), "{}", text);

    if is_handshake(text) {
        debug!("Received Engine.IO handshake, sending Socket.IO connect");
        if let Err(e) = handle.send_text(CONNECT_FRAME) {
            warn!("Could not answer handshake on socket {}: {}", handle.id(), e);
        }
        return;
    }

    if is_session_event(text) {
        debug!("Received session event, connection ready");
    }

    if !registry.dispatch(text) {
        debug!("No pending request claimed frame on socket {}", handle.id());
    }
}
