use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use crate::error::{Error, Result};
use crate::media::track::{LocalTrack, OutgoingTracks};
use crate::mesh::negotiator::{LinkNotifier, MediaLink, Negotiator};
use crate::protocol::{ClientMessage, NegotiationPayload};
use crate::types::{MediaKind, PeerId};

/// Negotiator backed by webrtc-rs. Offers and answers travel over the
/// signaling channel with all ICE candidates already gathered.
pub struct RtcNegotiator {
    api: API,
    ice_servers: Vec<String>,
    signals: mpsc::Sender<ClientMessage>,
}

impl RtcNegotiator {
    pub fn new(ice_servers: Vec<String>, signals: mpsc::Sender<ClientMessage>) -> Result<Self> {
        // Create a MediaEngine object to configure the supported codec
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let api = APIBuilder::new().with_media_engine(media_engine).build();

        Ok(Self {
            api,
            ice_servers,
            signals,
        })
    }

    fn configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    async fn new_peer_connection(&self, notifier: LinkNotifier) -> Result<Arc<RTCPeerConnection>> {
        let peer_connection = Arc::new(self.api.new_peer_connection(self.configuration()).await?);

        // First remote track of any kind marks the connection active.
        let media_notifier = notifier.clone();
        let seen_media = Arc::new(AtomicBool::new(false));
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                tracing::debug!(
                    "remote {} track from {}",
                    track.kind(),
                    media_notifier.peer_id()
                );
                if !seen_media.swap(true, Ordering::SeqCst) {
                    media_notifier.remote_media();
                }
                Box::pin(async {})
            },
        ));

        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                tracing::debug!("connection to {} is {}", notifier.peer_id(), s);
                if matches!(
                    s,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
                ) {
                    notifier.disconnected();
                }
                Box::pin(async {})
            },
        ));

        Ok(peer_connection)
    }

    async fn send_signal(&self, to_peer: &PeerId, payload: NegotiationPayload) -> Result<()> {
        self.signals
            .send(ClientMessage::Signal {
                to_peer: to_peer.clone(),
                payload,
            })
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn offer(
        &self,
        peer_connection: &RTCPeerConnection,
        peer_id: &PeerId,
        tracks: &OutgoingTracks,
    ) -> Result<()> {
        add_tracks(peer_connection, tracks).await?;
        let offer = peer_connection.create_offer(None).await?;
        let sdp = complete_local_description(peer_connection, offer).await?;
        self.send_signal(peer_id, NegotiationPayload::Offer { sdp }).await
    }

    async fn answer(
        &self,
        peer_connection: &RTCPeerConnection,
        peer_id: &PeerId,
        offer_sdp: &str,
        tracks: &OutgoingTracks,
    ) -> Result<()> {
        add_tracks(peer_connection, tracks).await?;
        let offer = RTCSessionDescription::offer(offer_sdp.to_owned())?;
        peer_connection.set_remote_description(offer).await?;
        let answer = peer_connection.create_answer(None).await?;
        let sdp = complete_local_description(peer_connection, answer).await?;
        self.send_signal(peer_id, NegotiationPayload::Answer { sdp }).await
    }
}

async fn add_tracks(peer_connection: &RTCPeerConnection, tracks: &OutgoingTracks) -> Result<()> {
    for track in tracks.iter() {
        peer_connection.add_track(track.rtc_track()).await?;
    }
    Ok(())
}

/// Applies `desc` locally and returns the SDP once ICE gathering is done.
async fn complete_local_description(
    peer_connection: &RTCPeerConnection,
    desc: RTCSessionDescription,
) -> Result<String> {
    let mut gather_complete = peer_connection.gathering_complete_promise().await;
    peer_connection.set_local_description(desc).await?;
    let _ = gather_complete.recv().await;

    peer_connection
        .local_description()
        .await
        .map(|desc| desc.sdp)
        .ok_or_else(|| Error::Other(anyhow!("no local description after gathering")))
}

/// Wraps a negotiated connection, or closes it when negotiation failed.
async fn finish_negotiation(
    peer_id: &PeerId,
    peer_connection: Arc<RTCPeerConnection>,
    negotiated: Result<()>,
) -> Result<Arc<dyn MediaLink>> {
    match negotiated {
        Ok(()) => Ok(Arc::new(RtcLink { peer_connection })),
        Err(err) => {
            if let Err(close_err) = peer_connection.close().await {
                tracing::warn!("closing connection to {} failed: {}", peer_id, close_err);
            }
            Err(err)
        }
    }
}

#[async_trait]
impl Negotiator for RtcNegotiator {
    async fn place_call(
        &self,
        peer_id: &PeerId,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>> {
        let peer_connection = self.new_peer_connection(notifier).await?;
        let negotiated = self.offer(&peer_connection, peer_id, tracks).await;
        finish_negotiation(peer_id, peer_connection, negotiated).await
    }

    async fn answer_call(
        &self,
        peer_id: &PeerId,
        offer_sdp: &str,
        tracks: &OutgoingTracks,
        notifier: LinkNotifier,
    ) -> Result<Arc<dyn MediaLink>> {
        let peer_connection = self.new_peer_connection(notifier).await?;
        let negotiated = self.answer(&peer_connection, peer_id, offer_sdp, tracks).await;
        finish_negotiation(peer_id, peer_connection, negotiated).await
    }
}

struct RtcLink {
    peer_connection: Arc<RTCPeerConnection>,
}

#[async_trait]
impl MediaLink for RtcLink {
    async fn replace_track(&self, kind: MediaKind, track: Option<&LocalTrack>) -> Result<bool> {
        let codec_type = match kind {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        };
        // Match on the transceiver, a sender whose track was cleared has no kind.
        for transceiver in self.peer_connection.get_transceivers().await {
            let sending = matches!(
                transceiver.direction(),
                RTCRtpTransceiverDirection::Sendrecv | RTCRtpTransceiverDirection::Sendonly
            );
            if transceiver.kind() != codec_type || !sending {
                continue;
            }
            transceiver
                .sender()
                .await
                .replace_track(track.map(LocalTrack::rtc_track))
                .await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn accept_answer(&self, sdp: &str) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp.to_owned())?;
        self.peer_connection.set_remote_description(answer).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
