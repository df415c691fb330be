//! In-memory negotiator for tests. Links record what was sent over them.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::mesh::connection::Direction;
use crate::mesh::negotiator::{LinkNotifier, MediaLink, Negotiator};
use crate::media::track::{LocalTrack, OutgoingTracks};
use crate::types::{MediaKind, PeerId};

pub(crate) struct FakeLink {
    pub peer_id: PeerId,
    pub direction: Direction,
    pub notifier: LinkNotifier,
    audio: Mutex<Option<String>>,
    video: Mutex<Option<String>>,
    has_video_sender: bool,
    pub replacements: AtomicUsize,
    pub fail_replace: AtomicBool,
    pub closed: AtomicBool,
    pub answer: Mutex<Option<String>>,
}

impl FakeLink {
    fn new(peer_id: PeerId, direction: Direction, tracks: &OutgoingTracks, notifier: LinkNotifier) -> Self {
        Self {
            peer_id,
            direction,
            notifier,
            audio: Mutex::new(tracks.audio.as_ref().map(|t| t.id().to_string())),
            video: Mutex::new(tracks.video.as_ref().map(|t| t.id().to_string())),
            has_video_sender: tracks.video.is_some(),
            replacements: AtomicUsize::new(0),
            fail_replace: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            answer: Mutex::new(None),
        }
    }

    pub fn video_track(&self) -> Option<String> {
        self.video.lock().unwrap().clone()
    }

    pub fn audio_track(&self) -> Option<String> {
        self.audio.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaLink for FakeLink {
    async fn replace_track(&self, kind: MediaKind, track: Option<&LocalTrack>) -> Result<bool> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(Error::Other(anyhow::anyhow!("sender busy")));
        }
        let slot = match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video if self.has_video_sender => &self.video,
            MediaKind::Video => return Ok(false),
        };
        *slot.lock().unwrap() = track.map(|t| t.id().to_string());
        self.replacements.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn accept_answer(&self, sdp: &str) -> Result<()> {
        *self.answer.lock().unwrap() = Some(sdp.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeNegotiator {
    links: Mutex<Vec<Arc<FakeLink>>>,
    pub fail_calls: AtomicBool,
}

impl FakeNegotiator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn links(&self) -> Vec<Arc<FakeLink>> {
        self.links.lock().unwrap().clone()
    }

    /// Most recent link created towards `peer_id`.
    pub fn link_for(&self, peer_id: &str) -> Option<Arc<FakeLink>> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|l| l.peer_id.as_str() == peer_id)
            .cloned()
    }

    fn open(
        &self,
        peer_id: &PeerId,
        direction: Direction,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>> {
        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(Error::Other(anyhow::anyhow!("negotiation failed")));
        }
        let link = Arc::new(FakeLink::new(peer_id.clone(), direction, tracks, notifier));
        self.links.lock().unwrap().push(Arc::clone(&link));
        Ok(link)
    }
}

#[async_trait]
impl Negotiator for FakeNegotiator {
    async fn place_call(
        &self,
        peer_id: &PeerId,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>> {
        self.open(peer_id, Direction::Originated, tracks, notifier)
    }

    async fn answer_call(
        &self,
        peer_id: &PeerId,
        _offer_sdp: &str,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>> {
        self.open(peer_id, Direction::Answered, tracks, notifier)
    }
}
