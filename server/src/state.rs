use std::sync::Arc;
use std::time::Duration;

use crate::gateway::Gateway;

/// WebSocket keepalive used to reclaim half-open connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    /// How often the server sends a WebSocket ping.
    pub interval: Duration,
    /// How long to wait for the matching pong before closing.
    pub timeout: Duration,
}

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The relay: connection registry, rooms, clock sync and fan-out
    pub gateway: Arc<Gateway>,
    /// Keepalive policy; `None` disables idle reaping
    pub keepalive: Option<Keepalive>,
}

impl AppState {
    pub fn new(gateway: Arc<Gateway>, keepalive: Option<Keepalive>) -> Self {
        Self { gateway, keepalive }
    }
}
