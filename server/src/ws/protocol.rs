use crate::proto::decode_client_event;
use crate::state::AppState;
use crate::ws::ConnectionId;

/// Handle an incoming text (JSON) message.
///
/// There is no error reply in this protocol: frames that fail to decode,
/// name an unknown event, or miss a required field are dropped.
pub fn handle_text_message(text: &str, state: &AppState, conn_id: ConnectionId) {
    match decode_client_event(text) {
        Ok(event) => state.gateway.dispatch(conn_id, event),
        Err(e) => {
            tracing::debug!(
                conn_id = %conn_id,
                error = %e,
                "Dropping malformed frame: {}",
                text.chars().take(100).collect::<String>()
            );
        }
    }
}

/// Handle an incoming binary message. Clients speak JSON text, but a UTF-8
/// binary frame is accepted the same way.
pub fn handle_binary_message(data: &[u8], state: &AppState, conn_id: ConnectionId) {
    match std::str::from_utf8(data) {
        Ok(text) => handle_text_message(text, state, conn_id),
        Err(_) => {
            tracing::debug!(
                conn_id = %conn_id,
                len = data.len(),
                "Dropping non-UTF-8 binary frame"
            );
        }
    }
}
