use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::media::{CaptureDevices, LocalMediaController};
use crate::mesh::{ConnectionState, MeshEvent, MeshEventReceiver, MeshEventSender, Negotiator, PeerMeshManager};
use crate::protocol::{ClientMessage, NegotiationPayload, ServerMessage};
use crate::types::{PeerId, RoomId};

/// User intents fed into a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    ToggleMute,
    ToggleCamera,
    ToggleScreenShare,
    Chat(String),
    Leave,
}

/// What a front end needs to render the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Joined { room_id: RoomId },
    PeerJoined { peer_id: PeerId, name: String },
    PeerLeft { peer_id: PeerId },
    Chat { name: String, text: String },
    ConnectionState { peer_id: PeerId, state: ConnectionState },
    AudioEnabled(bool),
    VideoEnabled(bool),
    ScreenShare(bool),
    Error(String),
}

enum Step {
    Server(Option<ServerMessage>),
    Mesh(MeshEvent),
    Control(Option<Control>),
    ScreenEnded,
}

/// One participant in one room. Owns its mesh and capture tracks and is
/// driven by a single task through [`ClientSession::run`].
pub struct ClientSession {
    room_id: RoomId,
    peer_id: PeerId,
    identity_token: Option<String>,
    mesh: PeerMeshManager,
    media: Option<LocalMediaController>,
    outbound: mpsc::Sender<ClientMessage>,
    events: mpsc::UnboundedSender<SessionEvent>,
    joined: bool,
    left: bool,
}

impl ClientSession {
    pub fn new(
        config: &ClientConfig,
        negotiator: Arc<dyn Negotiator>,
        mesh_events: MeshEventSender,
        outbound: mpsc::Sender<ClientMessage>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            room_id: config.room_id.clone(),
            peer_id: config.peer_id.clone(),
            identity_token: config.identity_token.clone(),
            mesh: PeerMeshManager::new(negotiator, mesh_events),
            media: None,
            outbound,
            events,
            joined: false,
            left: false,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn mesh(&self) -> &PeerMeshManager {
        &self.mesh
    }

    pub fn media(&self) -> Option<&LocalMediaController> {
        self.media.as_ref()
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.outbound.send(msg).await.map_err(|_| Error::ChannelClosed)
    }

    /// Captures local media and announces us to the room. Nothing is sent
    /// when capture fails.
    pub async fn join(&mut self, devices: Arc<dyn CaptureDevices>) -> Result<()> {
        let media = LocalMediaController::acquire(devices).await?;
        self.mesh.set_local_tracks(media.outgoing_tracks());
        self.media = Some(media);

        self.send(ClientMessage::Join {
            room_id: self.room_id.clone(),
            peer_id: self.peer_id.clone(),
            identity_token: self.identity_token.clone(),
        })
        .await?;
        self.joined = true;
        tracing::info!("{} joined {}", self.peer_id, self.room_id);
        self.emit(SessionEvent::Joined {
            room_id: self.room_id.clone(),
        });
        Ok(())
    }

    /// Processes server messages, mesh events and controls until the user
    /// leaves or the server goes away.
    pub async fn run(
        &mut self,
        mut inbound: mpsc::Receiver<ServerMessage>,
        mut mesh_events: MeshEventReceiver,
        mut controls: mpsc::Receiver<Control>,
    ) -> Result<()> {
        loop {
            let screen_ended = self.media.as_ref().and_then(LocalMediaController::screen_ended_signal);
            let step = tokio::select! {
                msg = inbound.recv() => Step::Server(msg),
                Some(event) = mesh_events.recv() => Step::Mesh(event),
                control = controls.recv() => Step::Control(control),
                _ = screen_share_ended(screen_ended) => Step::ScreenEnded,
            };

            match step {
                Step::Server(Some(msg)) => self.handle_server(msg).await,
                Step::Server(None) => {
                    tracing::warn!("signaling channel closed, leaving {}", self.room_id);
                    self.leave().await?;
                    return Err(Error::ChannelClosed);
                }
                Step::Mesh(event) => {
                    if let Some((peer_id, state)) = self.mesh.handle_event(event).await {
                        self.emit(SessionEvent::ConnectionState { peer_id, state });
                    }
                }
                Step::Control(None) => return self.leave().await,
                Step::Control(Some(control)) => {
                    if self.handle_control(control).await? {
                        return Ok(());
                    }
                }
                Step::ScreenEnded => {
                    if let Some(media) = self.media.as_mut() {
                        media.stop_screen_share(&mut self.mesh).await;
                        self.emit(SessionEvent::ScreenShare(false));
                    }
                }
            }
        }
    }

    async fn handle_server(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::UserConnected {
                participant_id,
                name,
            } => {
                if participant_id == self.peer_id {
                    return;
                }
                tracing::info!("{} ({}) joined", name, participant_id);
                self.emit(SessionEvent::PeerJoined {
                    peer_id: participant_id.clone(),
                    name,
                });
                match self.mesh.call_new_peer(participant_id.clone()).await {
                    Ok(state) => self.emit(SessionEvent::ConnectionState {
                        peer_id: participant_id,
                        state,
                    }),
                    Err(err) => {
                        tracing::warn!("calling {} failed: {}", participant_id, err);
                        self.emit(SessionEvent::Error(err.to_string()));
                    }
                }
            }
            ServerMessage::UserDisconnected { participant_id } => {
                tracing::info!("{} left", participant_id);
                if self.mesh.close_peer(&participant_id).await {
                    self.emit(SessionEvent::ConnectionState {
                        peer_id: participant_id.clone(),
                        state: ConnectionState::Closed,
                    });
                }
                self.emit(SessionEvent::PeerLeft {
                    peer_id: participant_id,
                });
            }
            ServerMessage::Chat { name, text } => {
                self.emit(SessionEvent::Chat { name, text });
            }
            ServerMessage::Signal { from_peer, payload } => match payload {
                NegotiationPayload::Offer { sdp } => {
                    match self.mesh.answer_call(from_peer.clone(), &sdp).await {
                        Ok(state) => self.emit(SessionEvent::ConnectionState {
                            peer_id: from_peer,
                            state,
                        }),
                        Err(err) => {
                            tracing::warn!("answering {} failed: {}", from_peer, err);
                            self.emit(SessionEvent::Error(err.to_string()));
                        }
                    }
                }
                NegotiationPayload::Answer { sdp } => {
                    if let Err(err) = self.mesh.accept_answer(&from_peer, &sdp).await {
                        tracing::warn!("answer from {} rejected: {}", from_peer, err);
                        self.emit(SessionEvent::Error(err.to_string()));
                    }
                }
            },
            ServerMessage::Error { message } => {
                tracing::warn!("server error: {}", message);
                self.emit(SessionEvent::Error(message));
            }
        }
    }

    /// Returns true once the session has left.
    async fn handle_control(&mut self, control: Control) -> Result<bool> {
        match control {
            Control::ToggleMute => {
                if let Some(enabled) = self.media.as_ref().and_then(LocalMediaController::toggle_mute) {
                    self.emit(SessionEvent::AudioEnabled(enabled));
                }
            }
            Control::ToggleCamera => {
                if let Some(enabled) = self.media.as_ref().and_then(LocalMediaController::toggle_camera) {
                    self.emit(SessionEvent::VideoEnabled(enabled));
                }
            }
            Control::ToggleScreenShare => {
                let Some(media) = self.media.as_mut() else {
                    return Ok(false);
                };
                match media.toggle_screen_share(&mut self.mesh).await {
                    Ok(sharing) => self.emit(SessionEvent::ScreenShare(sharing)),
                    Err(err) => {
                        tracing::warn!("screen share failed: {}", err);
                        self.emit(SessionEvent::Error(err.to_string()));
                    }
                }
            }
            Control::Chat(text) => self.send(ClientMessage::Chat { text }).await?,
            Control::Leave => {
                self.leave().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Closes every connection, releases capture and tells the server.
    /// Safe to call more than once.
    pub async fn leave(&mut self) -> Result<()> {
        if self.left {
            return Ok(());
        }
        self.left = true;

        let closed = self.mesh.leave().await;
        if let Some(media) = self.media.as_mut() {
            media.release();
        }
        if self.joined && self.send(ClientMessage::Leave).await.is_err() {
            tracing::debug!("server already gone, leave not sent");
        }
        tracing::info!("{} left {} after closing {} connection(s)", self.peer_id, self.room_id, closed);
        Ok(())
    }
}

async fn screen_share_ended(signal: Option<watch::Receiver<bool>>) {
    match signal {
        Some(mut ended) => {
            let _ = ended.wait_for(|ended| *ended).await;
        }
        None => std::future::pending().await,
    }
}
