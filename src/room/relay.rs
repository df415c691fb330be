//! Room-scoped fan-out. Delivery is a push onto each member's outbox: best
//! effort, at most once, no acknowledgement. Ordering per recipient follows
//! the order in which the registry calls these functions.

use crate::protocol::{NegotiationPayload, ServerMessage};
use crate::room::state::{Participant, Room};
use crate::types::{PeerId, SessionId};

fn deliver(recipient: &Participant, msg: ServerMessage) -> bool {
    if recipient.outbox.send(msg).is_err() {
        tracing::debug!("outbox of {} is closed, dropping message", recipient.session_id);
        return false;
    }
    true
}

fn fan_out(room: &Room, except: SessionId, msg: ServerMessage) -> usize {
    room.others(except)
        .filter(|p| deliver(p, msg.clone()))
        .count()
}

pub(crate) fn broadcast_join(room: &Room, joined: &Participant) -> usize {
    let msg = ServerMessage::UserConnected {
        participant_id: joined.peer_id.clone(),
        name: joined.name.clone(),
    };
    let delivered = fan_out(room, joined.session_id, msg);
    tracing::debug!("room {}: announced {} to {} member(s)", room.id, joined.peer_id, delivered);
    delivered
}

/// Called after `left` has been removed, so every remaining member is told.
pub(crate) fn broadcast_leave(room: &Room, left: &Participant) -> usize {
    let msg = ServerMessage::UserDisconnected {
        participant_id: left.peer_id.clone(),
    };
    let delivered = fan_out(room, left.session_id, msg);
    tracing::debug!("room {}: announced departure of {} to {} member(s)", room.id, left.peer_id, delivered);
    delivered
}

pub(crate) fn relay_chat(room: &Room, sender: &Participant, text: String) -> usize {
    let msg = ServerMessage::Chat {
        name: sender.name.clone(),
        text,
    };
    fan_out(room, sender.session_id, msg)
}

pub(crate) fn forward_signal(
    room: &Room,
    sender: &Participant,
    to_peer: &PeerId,
    payload: NegotiationPayload,
) -> bool {
    let Some(target) = room.by_peer(to_peer) else {
        tracing::debug!("room {}: signal target {} not present", room.id, to_peer);
        return false;
    };
    if target.session_id == sender.session_id {
        return false;
    }
    deliver(
        target,
        ServerMessage::Signal {
            from_peer: sender.peer_id.clone(),
            payload,
        },
    )
}
