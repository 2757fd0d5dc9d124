//! Sync Protocol Messages
//!
//! Every message travels as a self-describing JSON object over the room's
//! broadcast channel:
//!
//! ```json
//! { "kind": "playback_state", "payload": { ... }, "senderId": "...", "senderName": "..." }
//! ```
//!
//! Decoding tolerates unknown fields so newer peers can extend the envelope
//! without breaking older ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::playback::PlaybackState;

/// Role assigned to a participant when the session is constructed.
///
/// Fixed for the session's lifetime; the protocol never negotiates or
/// transfers it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Viewer,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// Reactions participants can flash at each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmojiType {
    Heart,
    Sad,
    Funny,
    Scared,
}

/// An ephemeral reaction broadcast to the room. Never stored, no ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiReaction {
    pub emoji: EmojiType,
    pub sender_id: String,
    pub sender_name: String,
    /// Sender wall-clock time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Kind-specific payload of a [`SyncMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum MessageBody {
    /// A participant's playback snapshot; receivers reconcile to it.
    PlaybackState(PlaybackState),
    /// A new joiner asking the room for current state.
    SyncRequest {},
    /// Answer to a sync request. Receivers apply it exactly like
    /// `PlaybackState`, which also re-syncs anyone else who drifted.
    SyncResponse(PlaybackState),
    /// Join announcement carrying display name and role.
    UserJoined { name: String, role: Role },
    /// Leave notification. The name is informational only.
    UserLeft {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Ephemeral reaction; forwarded to observers, never applied as state.
    EmojiReaction(EmojiReaction),
}

/// Wire envelope for everything exchanged over the room channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    #[serde(flatten)]
    pub body: MessageBody,
    /// Transport-assigned sender identity, stable for the connection's
    /// lifetime. Receivers discard messages carrying their own identity:
    /// some transports echo broadcasts back to the sender.
    #[serde(rename = "senderId")]
    pub sender_id: String,
    /// Display name; not guaranteed unique.
    #[serde(rename = "senderName", default)]
    pub sender_name: String,
    /// Sender role, when the sender includes it. Legacy peers omit this and
    /// receivers fall back to the roster.
    #[serde(rename = "senderRole", default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<Role>,
}

/// A message that could not be turned into a [`SyncMessage`]. Always dropped
/// and logged, never surfaced to the session's caller.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed sync message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("sync message carries no sender identity")]
    MissingSender,
}

/// Serialize a message for the room channel.
pub fn encode(message: &SyncMessage) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(message)
}

/// Parse bytes received from the room channel.
///
/// Fails on malformed bytes, a missing or unknown `kind`, a payload of the
/// wrong shape, or a missing/empty `senderId`. Unknown fields are ignored.
pub fn decode(bytes: &[u8]) -> Result<SyncMessage, DecodeError> {
    let message: SyncMessage = serde_json::from_slice(bytes)?;
    if message.sender_id.is_empty() {
        return Err(DecodeError::MissingSender);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> PlaybackState {
        PlaybackState {
            is_playing: true,
            position_secs: 42.5,
            timestamp_ms: 1_700_000_000_000,
            source_url: Some("https://example.com/stream.m3u8".to_string()),
        }
    }

    #[test]
    fn playback_state_round_trips() {
        let message = SyncMessage {
            body: MessageBody::PlaybackState(sample_state()),
            sender_id: "peer-1".to_string(),
            sender_name: "Alice".to_string(),
            sender_role: Some(Role::Host),
        };

        let bytes = encode(&message).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn wire_shape_matches_protocol() {
        let message = SyncMessage {
            body: MessageBody::PlaybackState(sample_state()),
            sender_id: "peer-1".to_string(),
            sender_name: "Alice".to_string(),
            sender_role: None,
        };

        let value: serde_json::Value = serde_json::from_slice(&encode(&message).unwrap()).unwrap();
        assert_eq!(value["kind"], "playback_state");
        assert_eq!(value["senderId"], "peer-1");
        assert_eq!(value["senderName"], "Alice");
        assert_eq!(value["payload"]["isPlaying"], true);
        assert_eq!(value["payload"]["currentTime"], 42.5);
        assert_eq!(value["payload"]["videoUrl"], "https://example.com/stream.m3u8");
    }

    #[test]
    fn kind_names_cover_every_variant() {
        let bodies = [
            (MessageBody::PlaybackState(sample_state()), "playback_state"),
            (MessageBody::SyncRequest {}, "sync_request"),
            (MessageBody::SyncResponse(sample_state()), "sync_response"),
            (
                MessageBody::UserJoined {
                    name: "Bob".to_string(),
                    role: Role::Viewer,
                },
                "user_joined",
            ),
            (MessageBody::UserLeft { name: None }, "user_left"),
            (
                MessageBody::EmojiReaction(EmojiReaction {
                    emoji: EmojiType::Heart,
                    sender_id: "peer-1".to_string(),
                    sender_name: "Alice".to_string(),
                    timestamp: 1,
                }),
                "emoji_reaction",
            ),
        ];

        for (body, expected_kind) in bodies {
            let value = serde_json::to_value(&body).unwrap();
            assert_eq!(value["kind"], expected_kind);
        }
    }

    #[test]
    fn decode_tolerates_unknown_fields() {
        let raw = br#"{
            "kind": "playback_state",
            "payload": {"isPlaying": false, "currentTime": 3.0, "timestamp": 99, "bitrate": 1080},
            "senderId": "peer-2",
            "senderName": "Bob",
            "sessionEpoch": 7
        }"#;

        let message = decode(raw).unwrap();
        match message.body {
            MessageBody::PlaybackState(state) => {
                assert!(!state.is_playing);
                assert_eq!(state.position_secs, 3.0);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_missing_or_empty_sender() {
        let missing = br#"{"kind": "sync_request", "payload": {}, "senderName": "Bob"}"#;
        assert!(matches!(decode(missing), Err(DecodeError::Malformed(_))));

        let empty = br#"{"kind": "sync_request", "payload": {}, "senderId": "", "senderName": "Bob"}"#;
        assert!(matches!(decode(empty), Err(DecodeError::MissingSender)));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"not json").is_err());
        assert!(decode(br#"{"senderId": "peer-1"}"#).is_err());
        assert!(decode(br#"{"kind": "time_travel", "payload": {}, "senderId": "p"}"#).is_err());
        // Payload of the wrong shape for the kind.
        assert!(decode(br#"{"kind": "playback_state", "payload": "soon", "senderId": "p"}"#).is_err());
    }

    #[test]
    fn user_joined_carries_role() {
        let raw = br#"{
            "kind": "user_joined",
            "payload": {"name": "Carol", "role": "host"},
            "senderId": "peer-3",
            "senderName": "Carol"
        }"#;

        let message = decode(raw).unwrap();
        assert_eq!(
            message.body,
            MessageBody::UserJoined {
                name: "Carol".to_string(),
                role: Role::Host,
            }
        );
    }
}
