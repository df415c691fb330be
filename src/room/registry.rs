use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::room::{
    commands::{RoomCommand, RoomCommand::*},
    relay,
    state::{JoinOutcome, Room},
};
use crate::types::RoomId;

// Single writer for every room. Commands are applied to completion in
// arrival order, which is what gives each room its causal broadcast order.
pub(crate) async fn room_registry(rx: &mut mpsc::Receiver<RoomCommand>) {
    tracing::trace!("room_registry start");

    let mut rooms: HashMap<RoomId, Room> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        tracing::trace!("command received: {:?}", cmd);
        match cmd {
            Join {
                room_id,
                participant,
                resp,
            } => {
                let room = rooms
                    .entry(room_id.clone())
                    .or_insert_with(|| Room::new(room_id.clone()));
                let joined = participant.clone();
                let outcome = room.add_participant(participant);
                match outcome {
                    JoinOutcome::Inserted => {
                        tracing::info!(
                            "room {}: {} joined as {} ({})",
                            room_id,
                            joined.peer_id,
                            joined.name,
                            joined.session_id
                        );
                        relay::broadcast_join(room, &joined);
                    }
                    JoinOutcome::Merged => {
                        tracing::debug!("room {}: merged repeated join of {}", room_id, joined.peer_id);
                    }
                }
                let _ = resp.send(outcome);
            }
            Leave {
                room_id,
                session_id,
                resp,
            } => {
                let Some(room) = rooms.get_mut(&room_id) else {
                    let _ = resp.send(false);
                    continue;
                };
                let removed = room.remove_session(session_id);
                if let Some(left) = &removed {
                    tracing::info!("room {}: {} left ({})", room_id, left.peer_id, session_id);
                    relay::broadcast_leave(room, left);
                }
                if room.is_empty() {
                    tracing::debug!("room {}: empty, dropping", room_id);
                    rooms.remove(&room_id);
                }
                let _ = resp.send(removed.is_some());
            }
            Chat {
                room_id,
                session_id,
                text,
                resp,
            } => {
                let delivered = rooms
                    .get(&room_id)
                    .and_then(|room| {
                        let sender = room.by_session(session_id)?;
                        Some(relay::relay_chat(room, sender, text))
                    })
                    .unwrap_or(0);
                let _ = resp.send(delivered);
            }
            Signal {
                room_id,
                session_id,
                to_peer,
                payload,
                resp,
            } => {
                let forwarded = rooms
                    .get(&room_id)
                    .and_then(|room| {
                        let sender = room.by_session(session_id)?;
                        Some(relay::forward_signal(room, sender, &to_peer, payload))
                    })
                    .unwrap_or(false);
                let _ = resp.send(forwarded);
            }
            Members { room_id, resp } => {
                let members = rooms
                    .get(&room_id)
                    .map(|room| room.participants().iter().map(|p| p.info()).collect())
                    .unwrap_or_default();
                let _ = resp.send(members);
            }
            RoomCount { resp } => {
                let _ = resp.send(rooms.len());
            }
        }
    }

    tracing::trace!("room_registry stop");
}
