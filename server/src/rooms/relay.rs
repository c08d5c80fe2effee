use std::sync::Arc;

use super::RoomRegistry;
use crate::proto::{ServerEvent, SyncCommandRequest, TrackChange};
use crate::ws::broadcast::{encode_event, send_to_connections};
use crate::ws::{ConnectionId, ConnectionRegistry};

/// Fans playback events out to the other members of a room.
///
/// Delivery is best effort and at most once: frames are queued on each
/// recipient's outbound channel and never retried. Per-sender order holds
/// because each sender's events are relayed from its single reader task into
/// FIFO queues. Nothing orders events from different senders.
///
/// Membership is read once per event, so a connection joining mid-broadcast
/// may or may not see that event.
#[derive(Debug, Clone)]
pub struct CommandRelay {
    rooms: Arc<RoomRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl CommandRelay {
    pub fn new(rooms: Arc<RoomRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self { rooms, connections }
    }

    /// Relay a playback command as `{cmd, timestamp, seekTime}`.
    /// Returns the number of peers it was queued for.
    pub fn relay_playback(&self, sender: ConnectionId, request: &SyncCommandRequest) -> usize {
        let event = ServerEvent::SyncCommand(request.command());
        self.fan_out(&request.room_id, sender, &event)
    }

    /// Relay a track change as `{roomId, videoId}`.
    /// Returns the number of peers it was queued for.
    pub fn relay_track_change(&self, sender: ConnectionId, change: &TrackChange) -> usize {
        let event = ServerEvent::ChangeVideo(change.clone());
        self.fan_out(&change.room_id, sender, &event)
    }

    fn fan_out(&self, room_id: &str, sender: ConnectionId, event: &ServerEvent) -> usize {
        let recipients = self.rooms.members_except(room_id, sender);
        if recipients.is_empty() {
            return 0;
        }
        let Some(frame) = encode_event(event) else {
            return 0;
        };
        send_to_connections(&self.connections, &recipients, &frame)
    }
}
