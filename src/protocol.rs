//! Messages carried by the signaling channel, JSON encoded and tagged by
//! `message_type`.

use crate::types::{PeerId, RoomId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum ClientMessage {
    Join {
        room_id: RoomId,
        peer_id: PeerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity_token: Option<String>,
    },
    Chat {
        text: String,
    },
    Signal {
        to_peer: PeerId,
        payload: NegotiationPayload,
    },
    Leave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum ServerMessage {
    UserConnected {
        participant_id: PeerId,
        name: String,
    },
    UserDisconnected {
        participant_id: PeerId,
    },
    Chat {
        name: String,
        text: String,
    },
    Signal {
        from_peer: PeerId,
        payload: NegotiationPayload,
    },
    Error {
        message: String,
    },
}

/// Session descriptions exchanged while forming a connection. Candidates are
/// gathered before sending, so the SDP is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NegotiationPayload {
    Offer { sdp: String },
    Answer { sdp: String },
}
