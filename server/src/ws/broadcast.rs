use axum::extract::ws::{CloseFrame, Message};

use super::{ConnectionId, ConnectionRegistry};
use crate::proto::{encode_server_event, ServerEvent};

/// Encode a server event as a text WebSocket frame.
pub fn encode_event(event: &ServerEvent) -> Option<Message> {
    match encode_server_event(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode server event");
            None
        }
    }
}

/// Queue a frame for one connection. Returns false if the connection is gone.
pub fn send_to_connection(registry: &ConnectionRegistry, id: ConnectionId, msg: &Message) -> bool {
    match registry.sender(id) {
        Some(sender) => sender.send(msg.clone()).is_ok(),
        None => false,
    }
}

/// Queue a frame for each of `ids`, skipping any that have gone away.
/// Returns the number of connections the frame was queued for.
pub fn send_to_connections(
    registry: &ConnectionRegistry,
    ids: &[ConnectionId],
    msg: &Message,
) -> usize {
    let mut delivered = 0;
    for id in ids {
        if send_to_connection(registry, *id, msg) {
            delivered += 1;
        } else {
            tracing::debug!(conn_id = %id, "Skipping closed connection");
        }
    }
    delivered
}

/// Ask every open connection to close (server shutdown).
/// Sends a WebSocket Close frame with the given code and reason.
pub fn close_all(registry: &ConnectionRegistry, close_code: u16, reason: &str) {
    let close_frame = CloseFrame {
        code: close_code,
        reason: reason.into(),
    };
    for id in registry.ids() {
        send_to_connection(registry, id, &Message::Close(Some(close_frame.clone())));
    }
}
