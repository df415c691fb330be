use crate::error::Result;
use crate::identity::NameResolver;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::{state::Outbox, Participant, RoomRegistryHandle};
use crate::types::{now_ms, PeerId, RoomId, SessionId};

/// Server end of one client's signaling channel. Bound to a single room by
/// the first join and released by `close`.
pub struct SignalingSession {
    session_id: SessionId,
    registry: RoomRegistryHandle,
    resolver: NameResolver,
    outbox: Outbox,
    scope: Option<(RoomId, PeerId)>,
}

impl SignalingSession {
    pub fn new(
        session_id: SessionId,
        registry: RoomRegistryHandle,
        resolver: NameResolver,
        outbox: Outbox,
    ) -> Self {
        Self {
            session_id,
            registry,
            resolver,
            outbox,
            scope: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.scope.as_ref().map(|(room_id, _)| room_id)
    }

    fn reply_error(&self, message: impl Into<String>) {
        let _ = self.outbox.send(ServerMessage::Error {
            message: message.into(),
        });
    }

    /// Handles a raw text frame. Malformed input is answered, not fatal.
    pub async fn handle_text(&mut self, text: &str) -> Result<()> {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => self.handle(msg).await,
            Err(err) => {
                tracing::debug!("{}: malformed message: {}", self.session_id, err);
                self.reply_error(format!("malformed message: {err}"));
                Ok(())
            }
        }
    }

    pub async fn handle(&mut self, msg: ClientMessage) -> Result<()> {
        match msg {
            ClientMessage::Join {
                room_id,
                peer_id,
                identity_token,
            } => {
                if let Some((current, _)) = &self.scope {
                    tracing::warn!(
                        "{}: second join for room {} ignored, already in {}",
                        self.session_id,
                        room_id,
                        current
                    );
                    self.reply_error(format!("already joined room {current}"));
                    return Ok(());
                }

                let name = self.resolver.resolve(identity_token.as_deref()).await;
                let participant = Participant {
                    session_id: self.session_id,
                    peer_id: peer_id.clone(),
                    name,
                    joined_at_ms: now_ms(),
                    outbox: self.outbox.clone(),
                };
                self.registry.join(room_id.clone(), participant).await?;
                self.scope = Some((room_id, peer_id));
            }
            ClientMessage::Chat { text } => {
                let Some(room_id) = self.room().cloned() else {
                    self.reply_error("join a room before chatting");
                    return Ok(());
                };
                self.registry.chat(room_id, self.session_id, text).await?;
            }
            ClientMessage::Signal { to_peer, payload } => {
                let Some(room_id) = self.room().cloned() else {
                    self.reply_error("join a room before signaling");
                    return Ok(());
                };
                let forwarded = self
                    .registry
                    .signal(room_id, self.session_id, to_peer.clone(), payload)
                    .await?;
                if !forwarded {
                    tracing::debug!("{}: signal to {} dropped", self.session_id, to_peer);
                }
            }
            ClientMessage::Leave => self.close().await?,
        }
        Ok(())
    }

    /// Leaves the bound room, if any. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        if let Some((room_id, peer_id)) = self.scope.take() {
            tracing::debug!("{}: leaving room {} as {}", self.session_id, room_id, peer_id);
            self.registry.leave(room_id, self.session_id).await?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod failure {
    use super::SignalingSession;
    use crate::identity::NameResolver;
    use crate::protocol::{ClientMessage, ServerMessage};
    use crate::room::handle::test_helper_fn::drain;
    use crate::room::RoomRegistryHandle;
    use crate::types::{RoomId, SessionId};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn chat_before_join_is_rejected() {
        let registry = RoomRegistryHandle::spawn();
        let (outbox, mut rx) = mpsc::unbounded_channel();
        let mut s = SignalingSession::new(SessionId(1), registry, NameResolver::default(), outbox);

        s.handle(ClientMessage::Chat { text: "hi".into() }).await.unwrap();

        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn second_join_keeps_first_room() {
        let registry = RoomRegistryHandle::spawn();
        let (outbox, mut rx) = mpsc::unbounded_channel();
        let mut s = SignalingSession::new(SessionId(1), registry.clone(), NameResolver::default(), outbox);

        s.handle(ClientMessage::Join {
            room_id: "abc".into(),
            peer_id: "p1".into(),
            identity_token: None,
        })
        .await
        .unwrap();
        s.handle(ClientMessage::Join {
            room_id: "xyz".into(),
            peer_id: "p1".into(),
            identity_token: None,
        })
        .await
        .unwrap();

        assert_eq!(s.room(), Some(&RoomId::from("abc")));
        assert!(registry.members("xyz".into()).await.unwrap().is_empty());
        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Error { .. }]));
    }

    #[tokio::test]
    async fn malformed_frame_keeps_session_open() {
        let registry = RoomRegistryHandle::spawn();
        let (outbox, mut rx) = mpsc::unbounded_channel();
        let mut s = SignalingSession::new(SessionId(1), registry, NameResolver::default(), outbox);

        assert!(s.handle_text("not json").await.is_ok());
        assert!(matches!(drain(&mut rx).as_slice(), [ServerMessage::Error { .. }]));
    }
}
