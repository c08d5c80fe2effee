//! Connection gateway: per-connection lifecycle and event dispatch.
//!
//! A connection moves `Connecting -> Connected -> Disconnected`. The upgrade
//! handler calls [`Gateway::connect`] once the handshake completes, the reader
//! loop feeds every decoded event through [`Gateway::dispatch`], and transport
//! close ends in [`Gateway::disconnect`].
//!
//! Room membership carries no credentials. Anyone who knows a room id can join
//! it, observe its playback events and inject their own.

use std::sync::Arc;

use crate::clock::ClockSync;
use crate::proto::{ClientEvent, ServerEvent};
use crate::rooms::{CommandRelay, RoomRegistry};
use crate::ws::broadcast::{self, encode_event, send_to_connection};
use crate::ws::{ConnectionId, ConnectionRegistry, ConnectionSender};

/// Close code sent to every client on server shutdown (1001 = going away).
const CLOSE_GOING_AWAY: u16 = 1001;

/// The relay server. Built once at startup and shared by every connection task.
#[derive(Debug)]
pub struct Gateway {
    connections: Arc<ConnectionRegistry>,
    rooms: Arc<RoomRegistry>,
    relay: CommandRelay,
    clock: ClockSync,
    max_room_size: Option<usize>,
}

impl Gateway {
    pub fn new(clock: ClockSync, max_room_size: Option<usize>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let relay = CommandRelay::new(rooms.clone(), connections.clone());
        Self {
            connections,
            rooms,
            relay,
            clock,
            max_room_size,
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// `Connecting -> Connected`: register the connection's outbound queue.
    pub fn connect(&self, tx: ConnectionSender) -> ConnectionId {
        self.connections.register(tx)
    }

    /// Handle one inbound event for `conn`.
    ///
    /// Events for connections that are no longer registered are ignored, so a
    /// late event can never leave a room pointing at a dead connection.
    pub fn dispatch(&self, conn: ConnectionId, event: ClientEvent) {
        if !self.connections.contains(conn) {
            tracing::debug!(conn_id = %conn, "Dropping event for disconnected connection");
            return;
        }

        match event {
            ClientEvent::JoinRoom(room_id) => {
                match self.rooms.join_capped(conn, &room_id, self.max_room_size) {
                    Ok(added) => {
                        tracing::debug!(conn_id = %conn, room_id = %room_id, added, "Joined room");
                    }
                    Err(e) => {
                        tracing::info!(conn_id = %conn, error = %e, "Join refused");
                    }
                }
            }
            ClientEvent::LeaveRoom(room_id) => {
                let removed = self.rooms.leave(conn, &room_id);
                tracing::debug!(conn_id = %conn, room_id = %room_id, removed, "Left room");
            }
            ClientEvent::SyncPing(t0) => {
                let server_time = self.clock.respond_to_ping();
                tracing::trace!(conn_id = %conn, t0 = %t0, server_time, "Sync ping");
                if let Some(frame) = encode_event(&ServerEvent::SyncPong(server_time)) {
                    send_to_connection(&self.connections, conn, &frame);
                }
            }
            ClientEvent::SyncCommand(request) => {
                let delivered = self.relay.relay_playback(conn, &request);
                tracing::debug!(
                    conn_id = %conn,
                    room_id = %request.room_id,
                    cmd = %request.cmd,
                    delivered,
                    "Relayed playback command"
                );
            }
            ClientEvent::ChangeVideo(change) => {
                let delivered = self.relay.relay_track_change(conn, &change);
                tracing::debug!(
                    conn_id = %conn,
                    room_id = %change.room_id,
                    video_id = %change.video_id,
                    delivered,
                    "Relayed track change"
                );
            }
        }
    }

    /// `Connected -> Disconnected`: leave every room, then deregister.
    ///
    /// Safe to call more than once; only the first call returns true.
    pub fn disconnect(&self, conn: ConnectionId) -> bool {
        let left = self.rooms.leave_all(conn);
        let removed = self.connections.deregister(conn);
        if removed {
            tracing::debug!(conn_id = %conn, rooms = ?left, "Connection torn down");
        }
        removed
    }

    /// Send a Close frame to every live connection. Each reader loop then
    /// winds down through the normal disconnect path.
    pub fn close_all(&self) {
        tracing::info!(
            connections = self.connections.len(),
            "Closing all connections"
        );
        broadcast::close_all(&self.connections, CLOSE_GOING_AWAY, "Server shutting down");
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(ClockSync::default(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::tests::ManualClock;
    use crate::proto::{decode_client_event, SyncCommandRequest, TrackChange, Verbatim};
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    struct Client {
        id: ConnectionId,
        rx: mpsc::UnboundedReceiver<Message>,
    }

    impl Client {
        fn connect(gateway: &Gateway) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                id: gateway.connect(tx),
                rx,
            }
        }

        fn next_event(&mut self) -> Option<ServerEvent> {
            match self.rx.try_recv().ok()? {
                Message::Text(text) => serde_json::from_str(text.as_str()).ok(),
                _ => None,
            }
        }
    }

    fn join(gateway: &Gateway, client: &Client, room_id: &str) {
        gateway.dispatch(client.id, ClientEvent::JoinRoom(room_id.to_string()));
    }

    fn play_command(room_id: &str) -> ClientEvent {
        ClientEvent::SyncCommand(SyncCommandRequest {
            room_id: room_id.to_string(),
            cmd: "play".to_string(),
            timestamp: Verbatim::new("5000").unwrap(),
            seek_time: Some(Verbatim::new("12.5").unwrap()),
        })
    }

    #[test]
    fn test_play_reaches_peer_not_sender() {
        let gateway = Gateway::default();
        let mut a = Client::connect(&gateway);
        let mut b = Client::connect(&gateway);
        join(&gateway, &a, "r1");
        join(&gateway, &b, "r1");

        gateway.dispatch(a.id, play_command("r1"));

        match b.next_event() {
            Some(ServerEvent::SyncCommand(command)) => {
                assert_eq!(command.cmd, "play");
                assert_eq!(command.timestamp.get(), "5000");
                assert_eq!(command.seek_time.as_ref().map(Verbatim::get), Some("12.5"));
            }
            other => panic!("Expected SyncCommand, got: {:?}", other),
        }
        assert_eq!(a.next_event(), None);
    }

    #[test]
    fn test_decoded_command_reaches_peer_as_sent() {
        let gateway = Gateway::default();
        let a = Client::connect(&gateway);
        let mut b = Client::connect(&gateway);
        join(&gateway, &a, "r1");
        join(&gateway, &b, "r1");

        let frame = r#"{"event":"sync-command","data":{"roomId":"r1","cmd":"seek","timestamp":"5000","seekTime":null}}"#;
        gateway.dispatch(a.id, decode_client_event(frame).unwrap());

        match b.rx.try_recv() {
            Ok(Message::Text(text)) => assert_eq!(
                text.as_str(),
                r#"{"event":"sync-command","data":{"cmd":"seek","timestamp":"5000","seekTime":null}}"#
            ),
            other => panic!("Expected text frame, got: {:?}", other),
        }
    }

    #[test]
    fn test_change_video_room_isolation() {
        let gateway = Gateway::default();
        let a = Client::connect(&gateway);
        let mut b = Client::connect(&gateway);
        join(&gateway, &a, "r1");
        join(&gateway, &b, "r2");

        gateway.dispatch(
            a.id,
            ClientEvent::ChangeVideo(TrackChange {
                room_id: "r1".to_string(),
                video_id: "abc".to_string(),
            }),
        );

        assert_eq!(b.next_event(), None);
    }

    #[test]
    fn test_sync_ping_answers_with_server_time() {
        let gateway = Gateway::new(ClockSync::new(Arc::new(ManualClock::at(1060))), None);
        let mut a = Client::connect(&gateway);

        gateway.dispatch(a.id, ClientEvent::SyncPing(Verbatim::new("1000").unwrap()));

        assert_eq!(a.next_event(), Some(ServerEvent::SyncPong(1060)));
    }

    #[test]
    fn test_disconnect_cleans_up_and_is_idempotent() {
        let gateway = Gateway::default();
        let mut a = Client::connect(&gateway);
        let b = Client::connect(&gateway);
        join(&gateway, &a, "r1");
        join(&gateway, &a, "r2");
        join(&gateway, &b, "r1");

        assert!(gateway.disconnect(a.id));
        assert!(!gateway.disconnect(a.id));

        assert_eq!(gateway.rooms().members("r1"), vec![b.id]);
        assert_eq!(gateway.rooms().member_count("r2"), 0);
        assert_eq!(gateway.rooms().room_count(), 1);
        assert!(!gateway.connections().contains(a.id));

        gateway.dispatch(b.id, play_command("r1"));
        assert_eq!(a.next_event(), None);
    }

    #[test]
    fn test_events_after_disconnect_are_ignored() {
        let gateway = Gateway::default();
        let a = Client::connect(&gateway);
        gateway.disconnect(a.id);

        join(&gateway, &a, "r1");
        assert_eq!(gateway.rooms().room_count(), 0);
    }

    #[test]
    fn test_leave_room_stops_delivery() {
        let gateway = Gateway::default();
        let a = Client::connect(&gateway);
        let mut b = Client::connect(&gateway);
        join(&gateway, &a, "r1");
        join(&gateway, &b, "r1");

        gateway.dispatch(b.id, ClientEvent::LeaveRoom("r1".to_string()));
        gateway.dispatch(a.id, play_command("r1"));

        assert_eq!(b.next_event(), None);
        assert_eq!(gateway.rooms().members("r1"), vec![a.id]);
    }

    #[test]
    fn test_max_room_size_refuses_extra_member() {
        let gateway = Gateway::new(ClockSync::default(), Some(2));
        let a = Client::connect(&gateway);
        let b = Client::connect(&gateway);
        let mut c = Client::connect(&gateway);
        join(&gateway, &a, "r1");
        join(&gateway, &b, "r1");
        join(&gateway, &c, "r1");

        assert_eq!(gateway.rooms().member_count("r1"), 2);
        gateway.dispatch(a.id, play_command("r1"));
        assert_eq!(c.next_event(), None);
    }

    #[test]
    fn test_close_all_sends_close_frames() {
        let gateway = Gateway::default();
        let mut a = Client::connect(&gateway);

        gateway.close_all();

        match a.rx.try_recv() {
            Ok(Message::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_GOING_AWAY),
            other => panic!("Expected Close frame, got: {:?}", other),
        }
    }
}
