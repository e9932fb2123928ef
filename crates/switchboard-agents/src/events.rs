//! Signaling webhook payloads.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("malformed signaling event: {0}")]
pub struct EventParseError(#[from] serde_json::Error);

/// Participant and room lifecycle notifications from the signaling service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    ParticipantJoined { identity: String },
    ParticipantLeft { identity: String },
    /// Room names are call ids.
    RoomEnded { room: String },
    /// Kinds we do not act on, and known kinds missing their subject.
    Ignored { kind: String },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: Option<String>,
    event: Option<String>,
    participant: Option<RawParticipant>,
    room: Option<RawRoom>,
}

#[derive(Deserialize)]
struct RawParticipant {
    identity: Option<String>,
}

#[derive(Deserialize)]
struct RawRoom {
    name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl SignalingEvent {
    /// Parses a webhook body. Only invalid JSON is an error.
    pub fn parse(body: &[u8]) -> Result<Self, EventParseError> {
        let raw: RawEvent = serde_json::from_slice(body)?;
        let kind = raw.kind.or(raw.event).unwrap_or_default();
        let identity = non_empty(raw.participant.and_then(|p| p.identity));
        let room = non_empty(raw.room.and_then(|r| r.name));

        let event = match (kind.as_str(), identity, room) {
            ("participant_joined", Some(identity), _) => SignalingEvent::ParticipantJoined { identity },
            ("participant_left", Some(identity), _) => SignalingEvent::ParticipantLeft { identity },
            ("room_ended" | "room_disconnected", _, Some(room)) => SignalingEvent::RoomEnded { room },
            _ => SignalingEvent::Ignored { kind },
        };
        Ok(event)
    }
}
