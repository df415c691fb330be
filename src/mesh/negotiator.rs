//! Seam to the WebRTC negotiation layer. The mesh only needs to place and
//! answer calls, swap a sender's track and close; everything else stays
//! behind these traits.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::media::track::{LocalTrack, OutgoingTracks};
use crate::types::{MediaKind, PeerId};

/// Callbacks from a link, queued for the task that owns the mesh. The
/// generation ties an event to the connection instance that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshEvent {
    RemoteMedia { peer_id: PeerId, generation: u64 },
    Disconnected { peer_id: PeerId, generation: u64 },
}

pub type MeshEventSender = mpsc::UnboundedSender<MeshEvent>;
pub type MeshEventReceiver = mpsc::UnboundedReceiver<MeshEvent>;

#[derive(Debug, Clone)]
pub struct LinkNotifier {
    peer_id: PeerId,
    generation: u64,
    tx: MeshEventSender,
}

impl LinkNotifier {
    pub fn new(peer_id: PeerId, generation: u64, tx: MeshEventSender) -> Self {
        Self {
            peer_id,
            generation,
            tx,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn remote_media(&self) {
        let _ = self.tx.send(MeshEvent::RemoteMedia {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
        });
    }

    pub fn disconnected(&self) {
        let _ = self.tx.send(MeshEvent::Disconnected {
            peer_id: self.peer_id.clone(),
            generation: self.generation,
        });
    }
}

#[async_trait]
pub trait Negotiator: Send + Sync {
    async fn place_call(
        &self,
        peer_id: &PeerId,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>>;

    async fn answer_call(
        &self,
        peer_id: &PeerId,
        offer_sdp: &str,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>>;
}

#[async_trait]
pub trait MediaLink: Send + Sync {
    /// Swaps the track of the sender of `kind` in place. Returns false when
    /// the link has no such sender.
    async fn replace_track(&self, kind: MediaKind, track: Option<&LocalTrack>) -> Result<bool>;

    async fn accept_answer(&self, sdp: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
