use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;

use crate::error::Result;
use crate::media::track::{LocalTrack, OutgoingTracks};
use crate::mesh::connection::{ConnectionEvent, ConnectionState, Direction, MediaConnection};
use crate::mesh::negotiator::{LinkNotifier, MeshEvent, MeshEventSender, Negotiator};
use crate::types::{MediaKind, PeerId};

/// Owns every connection of one client. Lives inside the client session
/// task, so all mutation goes through `&mut self`.
pub struct PeerMeshManager {
    negotiator: Arc<dyn Negotiator>,
    events: MeshEventSender,
    connections: HashMap<PeerId, MediaConnection>,
    outgoing: OutgoingTracks,
    next_generation: u64,
}

impl PeerMeshManager {
    pub fn new(negotiator: Arc<dyn Negotiator>, events: MeshEventSender) -> Self {
        Self {
            negotiator,
            events,
            connections: HashMap::new(),
            outgoing: OutgoingTracks::default(),
            next_generation: 1,
        }
    }

    /// Tracks handed to connections created from now on.
    pub fn set_local_tracks(&mut self, tracks: OutgoingTracks) {
        self.outgoing = tracks;
    }

    pub fn outgoing(&self) -> &OutgoingTracks {
        &self.outgoing
    }

    /// The local view of what is being sent.
    pub fn preview(&self) -> Option<&LocalTrack> {
        self.outgoing.video.as_ref()
    }

    pub fn state(&self, peer_id: &PeerId) -> Option<ConnectionState> {
        self.connections.get(peer_id).map(MediaConnection::state)
    }

    pub fn connection(&self, peer_id: &PeerId) -> Option<&MediaConnection> {
        self.connections.get(peer_id)
    }

    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<_> = self.connections.keys().cloned().collect();
        peers.sort();
        peers
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn next_connection(&mut self, peer_id: &PeerId) -> (MediaConnection, LinkNotifier) {
        let generation = self.next_generation;
        self.next_generation += 1;
        let notifier = LinkNotifier::new(peer_id.clone(), generation, self.events.clone());
        (MediaConnection::new(peer_id.clone(), generation), notifier)
    }

    /// A peer joined after us: we were here first, so we originate.
    pub async fn call_new_peer(&mut self, peer_id: PeerId) -> Result<ConnectionState> {
        if let Some(existing) = self.connections.get(&peer_id) {
            if existing.state().is_live() {
                tracing::debug!("already connected to {}, not calling again", peer_id);
                return Ok(existing.state());
            }
        }

        let (mut conn, notifier) = self.next_connection(&peer_id);
        conn.apply(ConnectionEvent::Originate)?;
        let link = self
            .negotiator
            .place_call(&peer_id, &self.outgoing, notifier)
            .await?;
        let video_id = self.outgoing.video.as_ref().map(|t| t.id().to_string());
        conn.attach(link, Direction::Originated, video_id);
        let state = conn.state();
        self.connections.insert(peer_id, conn);
        Ok(state)
    }

    pub async fn answer_call(&mut self, peer_id: PeerId, offer_sdp: &str) -> Result<ConnectionState> {
        if self
            .connections
            .get(&peer_id)
            .is_some_and(|c| c.state().is_live())
        {
            tracing::warn!("fresh offer from {}, replacing its connection", peer_id);
            self.close_peer(&peer_id).await;
        }

        let (mut conn, notifier) = self.next_connection(&peer_id);
        conn.apply(ConnectionEvent::InboundOffer)?;
        let link = self
            .negotiator
            .answer_call(&peer_id, offer_sdp, &self.outgoing, notifier)
            .await?;
        let video_id = self.outgoing.video.as_ref().map(|t| t.id().to_string());
        conn.attach(link, Direction::Answered, video_id);
        let state = conn.state();
        self.connections.insert(peer_id, conn);
        Ok(state)
    }

    /// Applies the remote answer to a call we placed. Returns false when
    /// there is no such call waiting for one.
    pub async fn accept_answer(&mut self, peer_id: &PeerId, sdp: &str) -> Result<bool> {
        let Some(conn) = self.connections.get(peer_id) else {
            return Ok(false);
        };
        if conn.state() != ConnectionState::Connecting
            || conn.direction() != Some(Direction::Originated)
        {
            tracing::debug!("ignoring answer from {} while {}", peer_id, conn.state());
            return Ok(false);
        }
        match conn.link() {
            Some(link) => {
                link.accept_answer(sdp).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Applies a link callback. Returns the new state when one resulted.
    /// Events from an older generation or an already removed peer are dropped.
    pub async fn handle_event(&mut self, event: MeshEvent) -> Option<(PeerId, ConnectionState)> {
        match event {
            MeshEvent::RemoteMedia {
                peer_id,
                generation,
            } => {
                let conn = self
                    .connections
                    .get_mut(&peer_id)
                    .filter(|c| c.generation() == generation)?;
                if conn.state() != ConnectionState::Connecting {
                    return None;
                }
                let state = conn.apply(ConnectionEvent::RemoteMedia).ok()?;

                // Negotiated with a track that has since been substituted.
                let current = self.outgoing.video.as_ref();
                if conn.video_track_id.as_deref() != current.map(|t| t.id()) {
                    if let Some(link) = conn.link() {
                        tracing::debug!("follow-up video substitution for {}", peer_id);
                        let result = link.replace_track(MediaKind::Video, current).await;
                        match result {
                            Ok(_) => conn.video_track_id = current.map(|t| t.id().to_string()),
                            Err(err) => tracing::warn!("follow-up substitution for {} failed: {}", peer_id, err),
                        }
                    }
                }
                Some((peer_id, state))
            }
            MeshEvent::Disconnected {
                peer_id,
                generation,
            } => {
                let matches = self
                    .connections
                    .get(&peer_id)
                    .is_some_and(|c| c.generation() == generation);
                if !matches {
                    tracing::trace!("stale disconnect for {} (generation {})", peer_id, generation);
                    return None;
                }
                self.close_peer(&peer_id).await;
                Some((peer_id, ConnectionState::Closed))
            }
        }
    }

    /// Points every connecting or active connection's video sender at
    /// `track`, along with the local preview. No renegotiation happens.
    /// Returns how many senders were swapped.
    pub async fn replace_outgoing_video(&mut self, track: Option<LocalTrack>) -> usize {
        self.outgoing.video = track;
        let track = self.outgoing.video.as_ref();
        let track_id = track.map(|t| t.id().to_string());

        let mut replaced = 0;
        for conn in self.connections.values_mut() {
            if !conn.state().is_live() {
                continue;
            }
            let Some(link) = conn.link() else { continue };
            let result = link.replace_track(MediaKind::Video, track).await;
            match result {
                Ok(true) => {
                    replaced += 1;
                    conn.video_track_id = track_id.clone();
                }
                Ok(false) => {
                    tracing::trace!("{} has no video sender", conn.peer_id());
                    conn.video_track_id = track_id.clone();
                }
                Err(err) => {
                    tracing::warn!("video substitution for {} failed: {}", conn.peer_id(), err);
                }
            }
        }
        tracing::debug!("outgoing video now {:?} on {} connection(s)", track_id, replaced);
        replaced
    }

    /// Closes and forgets the connection to `peer_id`. Returns false if
    /// there was none.
    pub async fn close_peer(&mut self, peer_id: &PeerId) -> bool {
        let Some(mut conn) = self.connections.remove(peer_id) else {
            return false;
        };
        if conn.apply(ConnectionEvent::Close).is_ok() {
            if let Some(link) = conn.link() {
                if let Err(err) = link.close().await {
                    tracing::warn!("closing connection to {} failed: {}", peer_id, err);
                }
            }
        }
        true
    }

    /// Closes every connection and clears the mesh. Safe to repeat.
    pub async fn leave(&mut self) -> usize {
        let closing: Vec<_> = self
            .connections
            .drain()
            .filter_map(|(peer_id, mut conn)| {
                conn.apply(ConnectionEvent::Close).ok()?;
                conn.link().cloned().map(|link| (peer_id, link))
            })
            .collect();
        let count = closing.len();

        let results = join_all(closing.iter().map(|(_, link)| link.close())).await;
        for ((peer_id, _), result) in closing.iter().zip(results) {
            if let Err(err) = result {
                tracing::warn!("closing connection to {} failed: {}", peer_id, err);
            }
        }
        count
    }
}
