use crate::protocol::NegotiationPayload;
use crate::room::state::{JoinOutcome, Participant, ParticipantInfo};
use crate::types::{PeerId, RoomId, SessionId};
use tokio::sync::oneshot;

#[derive(Debug)]
pub(crate) enum RoomCommand {
    Join {
        room_id: RoomId,
        participant: Participant,
        resp: oneshot::Sender<JoinOutcome>,
    },
    Leave {
        room_id: RoomId,
        session_id: SessionId,
        resp: oneshot::Sender<bool>,
    },
    Chat {
        room_id: RoomId,
        session_id: SessionId,
        text: String,
        resp: oneshot::Sender<usize>,
    },
    Signal {
        room_id: RoomId,
        session_id: SessionId,
        to_peer: PeerId,
        payload: NegotiationPayload,
        resp: oneshot::Sender<bool>,
    },
    Members {
        room_id: RoomId,
        resp: oneshot::Sender<Vec<ParticipantInfo>>,
    },
    RoomCount {
        resp: oneshot::Sender<usize>,
    },
}
