use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::mesh::negotiator::MediaLink;
use crate::types::PeerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Active,
    Closed,
}

impl ConnectionState {
    /// `None` means the event is not valid in this state.
    pub fn on(self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent::*;
        use ConnectionState::*;
        match (self, event) {
            (Idle, Originate | InboundOffer) => Some(Connecting),
            (Connecting, RemoteMedia) => Some(Active),
            (Connecting | Active, Close) => Some(Closed),
            _ => None,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Active)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Active => write!(f, "Active"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Originate,
    InboundOffer,
    RemoteMedia,
    Close,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Originate => write!(f, "originate"),
            ConnectionEvent::InboundOffer => write!(f, "inbound offer"),
            ConnectionEvent::RemoteMedia => write!(f, "remote media"),
            ConnectionEvent::Close => write!(f, "close"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Originated,
    Answered,
}

/// One entry of the mesh: the connection to a single remote participant.
pub struct MediaConnection {
    peer_id: PeerId,
    state: ConnectionState,
    generation: u64,
    direction: Option<Direction>,
    link: Option<Arc<dyn MediaLink>>,
    /// Id of the video track this connection was last handed.
    pub(crate) video_track_id: Option<String>,
}

impl MediaConnection {
    pub fn new(peer_id: PeerId, generation: u64) -> Self {
        Self {
            peer_id,
            state: ConnectionState::Idle,
            generation,
            direction: None,
            link: None,
            video_track_id: None,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn link(&self) -> Option<&Arc<dyn MediaLink>> {
        self.link.as_ref()
    }

    pub(crate) fn attach(
        &mut self,
        link: Arc<dyn MediaLink>,
        direction: Direction,
        video_track_id: Option<String>,
    ) {
        self.link = Some(link);
        self.direction = Some(direction);
        self.video_track_id = video_track_id;
    }

    pub fn apply(&mut self, event: ConnectionEvent) -> Result<ConnectionState> {
        match self.state.on(event) {
            Some(next) => {
                tracing::debug!("connection {}: {} -> {} on {}", self.peer_id, self.state, next, event);
                self.state = next;
                Ok(next)
            }
            None => Err(Error::InvalidTransition {
                peer_id: self.peer_id.clone(),
                from: self.state,
                event,
            }),
        }
    }
}

impl fmt::Debug for MediaConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaConnection")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("direction", &self.direction)
            .field("video_track_id", &self.video_track_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionEvent::*;
    use ConnectionState::*;

    #[test]
    fn happy_path() {
        let mut conn = MediaConnection::new("p2".into(), 1);
        assert_eq!(conn.apply(Originate).unwrap(), Connecting);
        assert_eq!(conn.apply(RemoteMedia).unwrap(), Active);
        assert_eq!(conn.apply(Close).unwrap(), Closed);
    }

    #[test]
    fn connecting_can_close_before_media() {
        let mut conn = MediaConnection::new("p2".into(), 1);
        conn.apply(InboundOffer).unwrap();
        assert_eq!(conn.apply(Close).unwrap(), Closed);
    }

    #[test]
    fn invalid_transitions_leave_state_unchanged() {
        let mut conn = MediaConnection::new("p2".into(), 1);
        assert!(matches!(
            conn.apply(RemoteMedia),
            Err(Error::InvalidTransition { from: Idle, event: RemoteMedia, .. })
        ));
        assert_eq!(conn.state(), Idle);

        conn.apply(Originate).unwrap();
        conn.apply(Close).unwrap();
        assert!(conn.apply(Close).is_err());
        assert!(conn.apply(RemoteMedia).is_err());
        assert_eq!(conn.state(), Closed);
    }

    #[test]
    fn only_connecting_and_active_are_live() {
        assert!(!Idle.is_live());
        assert!(Connecting.is_live());
        assert!(Active.is_live());
        assert!(!Closed.is_live());
    }
}
