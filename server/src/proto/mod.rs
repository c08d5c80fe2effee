//! Wire format for the relay WebSocket.
//!
//! Every text frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Playback `timestamp` and `seekTime` are carried as [`Verbatim`] JSON so the
//! relayed frame holds the sender's own text for them, whatever its type.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use std::fmt;

/// Events a client may send to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Join the named room. The id is caller-supplied and not validated.
    JoinRoom(String),
    /// Leave the named room. Leaving a room the connection is not in is a no-op.
    LeaveRoom(String),
    /// Clock sync request carrying the client's local send time (`t0`).
    SyncPing(Verbatim),
    /// Playback command to relay to the rest of the room.
    SyncCommand(SyncCommandRequest),
    /// Track change to relay to the rest of the room.
    ChangeVideo(TrackChange),
}

/// Events the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Server wall clock in Unix epoch milliseconds at the time the ping was received.
    SyncPong(i64),
    SyncCommand(PlaybackCommand),
    ChangeVideo(TrackChange),
}

/// A JSON value kept as the exact text the client sent.
///
/// Any JSON type is accepted, including `null`, strings and integers wider
/// than 64 bits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Verbatim(Box<RawValue>);

impl Verbatim {
    /// Wrap a JSON fragment. Fails if `json` is not a single valid JSON value.
    pub fn new(json: impl Into<String>) -> Result<Self, serde_json::Error> {
        RawValue::from_string(json.into()).map(Self)
    }

    /// The JSON text as received.
    pub fn get(&self) -> &str {
        self.0.get()
    }
}

impl PartialEq for Verbatim {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl fmt::Display for Verbatim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.get())
    }
}

/// Treats an explicit `null` as present, so only an absent field is `None`.
fn present<'de, D>(deserializer: D) -> Result<Option<Verbatim>, D::Error>
where
    D: Deserializer<'de>,
{
    Verbatim::deserialize(deserializer).map(Some)
}

/// Inbound `sync-command` payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCommandRequest {
    pub room_id: String,
    pub cmd: String,
    pub timestamp: Verbatim,
    #[serde(default, deserialize_with = "present")]
    pub seek_time: Option<Verbatim>,
}

impl SyncCommandRequest {
    /// The room-less command peers receive.
    pub fn command(&self) -> PlaybackCommand {
        PlaybackCommand {
            cmd: self.cmd.clone(),
            timestamp: self.timestamp.clone(),
            seek_time: self.seek_time.clone(),
        }
    }
}

/// Playback command as delivered to the other members of a room.
///
/// `cmd` is conventionally `play`, `pause` or `seek`, but any string is relayed.
/// `seekTime` is omitted only when the sender omitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackCommand {
    pub cmd: String,
    pub timestamp: Verbatim,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub seek_time: Option<Verbatim>,
}

/// `change-video` payload, identical in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackChange {
    pub room_id: String,
    pub video_id: String,
}

/// Outer frame, decoded before the payload so key order does not matter.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    data: Box<RawValue>,
}

fn payload<'a, T: Deserialize<'a>>(data: &'a RawValue) -> Result<T, serde_json::Error> {
    serde_json::from_str(data.get())
}

/// Decode a client text frame.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let data: &RawValue = &envelope.data;
    match envelope.event.as_str() {
        "join-room" => payload(data).map(ClientEvent::JoinRoom),
        "leave-room" => payload(data).map(ClientEvent::LeaveRoom),
        "sync-ping" => payload(data).map(ClientEvent::SyncPing),
        "sync-command" => payload(data).map(ClientEvent::SyncCommand),
        "change-video" => payload(data).map(ClientEvent::ChangeVideo),
        other => Err(serde_json::Error::custom(format!("unknown event `{other}`"))),
    }
}

/// Encode a server event as JSON text.
pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relayed(text: &str) -> String {
        let ClientEvent::SyncCommand(req) = decode_client_event(text).unwrap() else {
            panic!("Expected SyncCommand");
        };
        encode_server_event(&ServerEvent::SyncCommand(req.command())).unwrap()
    }

    #[test]
    fn test_decode_join_room() {
        let event = decode_client_event(r#"{"event":"join-room","data":"r1"}"#).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom("r1".to_string()));
    }

    #[test]
    fn test_decode_data_before_event() {
        let event = decode_client_event(r#"{"data":"r1","event":"leave-room"}"#).unwrap();
        assert_eq!(event, ClientEvent::LeaveRoom("r1".to_string()));
    }

    #[test]
    fn test_decode_sync_command_with_seek() {
        let text = json!({
            "event": "sync-command",
            "data": {"roomId": "r1", "cmd": "play", "timestamp": 5000, "seekTime": 12.5}
        })
        .to_string();

        match decode_client_event(&text).unwrap() {
            ClientEvent::SyncCommand(req) => {
                assert_eq!(req.room_id, "r1");
                assert_eq!(req.cmd, "play");
                assert_eq!(req.timestamp.get(), "5000");
                assert_eq!(req.seek_time.as_ref().map(Verbatim::get), Some("12.5"));
            }
            other => panic!("Expected SyncCommand, got: {:?}", other),
        }
    }

    #[test]
    fn test_sync_command_missing_required_field_is_rejected() {
        for data in [
            json!({"roomId": "r1", "cmd": "pause"}),
            json!({"roomId": "r1", "timestamp": 1}),
            json!({"cmd": "pause", "timestamp": 1}),
        ] {
            let text = json!({"event": "sync-command", "data": data}).to_string();
            assert!(decode_client_event(&text).is_err(), "accepted {}", text);
        }
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(decode_client_event(r#"{"event":"chat","data":"hi"}"#).is_err());
        assert!(decode_client_event(r#"{"event":"join-room"}"#).is_err());
        assert!(decode_client_event("not json").is_err());
    }

    #[test]
    fn test_playback_command_relays_numbers_verbatim() {
        let encoded = relayed(
            r#"{"event":"sync-command","data":{"roomId":"r","cmd":"seek","timestamp":1700000000123,"seekTime":3}}"#,
        );
        assert_eq!(
            encoded,
            r#"{"event":"sync-command","data":{"cmd":"seek","timestamp":1700000000123,"seekTime":3}}"#
        );
    }

    #[test]
    fn test_explicit_null_seek_time_is_kept() {
        let encoded = relayed(
            r#"{"event":"sync-command","data":{"roomId":"r","cmd":"play","timestamp":5000,"seekTime":null}}"#,
        );
        assert_eq!(
            encoded,
            r#"{"event":"sync-command","data":{"cmd":"play","timestamp":5000,"seekTime":null}}"#
        );
    }

    #[test]
    fn test_non_numeric_values_are_relayed() {
        let encoded = relayed(
            r#"{"event":"sync-command","data":{"roomId":"r","cmd":"seek","timestamp":"5000","seekTime":"12.5"}}"#,
        );
        assert_eq!(
            encoded,
            r#"{"event":"sync-command","data":{"cmd":"seek","timestamp":"5000","seekTime":"12.5"}}"#
        );
    }

    #[test]
    fn test_wide_integer_timestamp_is_not_rewritten() {
        let encoded = relayed(
            r#"{"event":"sync-command","data":{"roomId":"r","cmd":"play","timestamp":100000000000000000000}}"#,
        );
        assert_eq!(
            encoded,
            r#"{"event":"sync-command","data":{"cmd":"play","timestamp":100000000000000000000}}"#
        );
    }

    #[test]
    fn test_absent_seek_time_is_omitted() {
        let command = PlaybackCommand {
            cmd: "pause".to_string(),
            timestamp: Verbatim::new("42").unwrap(),
            seek_time: None,
        };
        let encoded = encode_server_event(&ServerEvent::SyncCommand(command)).unwrap();
        assert_eq!(encoded, r#"{"event":"sync-command","data":{"cmd":"pause","timestamp":42}}"#);
    }

    #[test]
    fn test_server_event_decodes_back() {
        let text = r#"{"event":"sync-command","data":{"cmd":"play","timestamp":5000,"seekTime":null}}"#;
        let ServerEvent::SyncCommand(command) = serde_json::from_str(text).unwrap() else {
            panic!("Expected SyncCommand");
        };
        assert_eq!(command.seek_time.as_ref().map(Verbatim::get), Some("null"));
    }

    #[test]
    fn test_encode_sync_pong() {
        let encoded = encode_server_event(&ServerEvent::SyncPong(1060)).unwrap();
        assert_eq!(encoded, r#"{"event":"sync-pong","data":1060}"#);
    }
}
