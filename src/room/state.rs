use crate::protocol::ServerMessage;
use crate::types::{PeerId, RoomId, SessionId};
use serde::Serialize;
use tokio::sync::mpsc;

pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone)]
pub struct Participant {
    pub session_id: SessionId,
    pub peer_id: PeerId,
    pub name: String,
    pub joined_at_ms: u64,
    pub outbox: Outbox,
}

impl Participant {
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            session_id: self.session_id,
            peer_id: self.peer_id.clone(),
            name: self.name.clone(),
            joined_at_ms: self.joined_at_ms,
        }
    }
}

/// Membership snapshot without the delivery queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantInfo {
    pub session_id: SessionId,
    pub peer_id: PeerId,
    pub name: String,
    pub joined_at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Inserted,
    /// Same peer id was already present; its record was refreshed in place.
    Merged,
}

#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    participants: Vec<Participant>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            participants: Vec::new(),
        }
    }

    pub fn add_participant(&mut self, participant: Participant) -> JoinOutcome {
        match self
            .participants
            .iter_mut()
            .find(|p| p.peer_id == participant.peer_id)
        {
            Some(existing) => {
                existing.session_id = participant.session_id;
                existing.name = participant.name;
                existing.outbox = participant.outbox;
                JoinOutcome::Merged
            }
            None => {
                self.participants.push(participant);
                JoinOutcome::Inserted
            }
        }
    }

    pub fn remove_session(&mut self, session_id: SessionId) -> Option<Participant> {
        let index = self
            .participants
            .iter()
            .position(|p| p.session_id == session_id)?;
        Some(self.participants.remove(index))
    }

    pub fn by_session(&self, session_id: SessionId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.session_id == session_id)
    }

    pub fn by_peer(&self, peer_id: &PeerId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.peer_id == peer_id)
    }

    /// Everyone except the given session, in join order.
    pub fn others(&self, session_id: SessionId) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .filter(move |p| p.session_id != session_id)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
