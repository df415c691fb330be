use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::protocol::NegotiationPayload;
use crate::room::{
    commands::RoomCommand,
    registry::room_registry,
    state::{JoinOutcome, Participant, ParticipantInfo},
};
use crate::types::{PeerId, RoomId, SessionId};

const COMMAND_BUFFER: usize = 1024;

// Wrapper to encapsulate channel-related operations
#[derive(Clone)]
pub struct RoomRegistryHandle {
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomRegistryHandle {
    /// Starts the registry task on the current runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::channel::<RoomCommand>(COMMAND_BUFFER);
        tokio::spawn(async move { room_registry(&mut rx).await });
        Self { tx }
    }

    async fn request<T>(&self, cmd: RoomCommand, resp_rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| Error::RegistryUnavailable)?;
        resp_rx.await.map_err(|_| Error::RegistryUnavailable)
    }

    pub async fn join(&self, room_id: RoomId, participant: Participant) -> Result<JoinOutcome> {
        let (resp, resp_rx) = oneshot::channel();
        let cmd = RoomCommand::Join {
            room_id,
            participant,
            resp,
        };
        self.request(cmd, resp_rx).await
    }

    /// Returns whether a participant was actually removed.
    pub async fn leave(&self, room_id: RoomId, session_id: SessionId) -> Result<bool> {
        let (resp, resp_rx) = oneshot::channel();
        let cmd = RoomCommand::Leave {
            room_id,
            session_id,
            resp,
        };
        self.request(cmd, resp_rx).await
    }

    /// Returns how many recipients the message was handed to.
    pub async fn chat(&self, room_id: RoomId, session_id: SessionId, text: String) -> Result<usize> {
        let (resp, resp_rx) = oneshot::channel();
        let cmd = RoomCommand::Chat {
            room_id,
            session_id,
            text,
            resp,
        };
        self.request(cmd, resp_rx).await
    }

    pub async fn signal(
        &self,
        room_id: RoomId,
        session_id: SessionId,
        to_peer: PeerId,
        payload: NegotiationPayload,
    ) -> Result<bool> {
        let (resp, resp_rx) = oneshot::channel();
        let cmd = RoomCommand::Signal {
            room_id,
            session_id,
            to_peer,
            payload,
            resp,
        };
        self.request(cmd, resp_rx).await
    }

    pub async fn members(&self, room_id: RoomId) -> Result<Vec<ParticipantInfo>> {
        let (resp, resp_rx) = oneshot::channel();
        self.request(RoomCommand::Members { room_id, resp }, resp_rx)
            .await
    }

    pub async fn room_count(&self) -> Result<usize> {
        let (resp, resp_rx) = oneshot::channel();
        self.request(RoomCommand::RoomCount { resp }, resp_rx).await
    }
}

#[cfg(test)]
pub(crate) mod test_helper_fn {
    use crate::protocol::ServerMessage;
    use crate::room::state::Participant;
    use crate::types::SessionId;
    use tokio::sync::mpsc;

    pub(crate) fn participant(
        session: u64,
        peer: &str,
        name: &str,
    ) -> (Participant, mpsc::UnboundedReceiver<ServerMessage>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let participant = Participant {
            session_id: SessionId(session),
            peer_id: peer.into(),
            name: name.to_string(),
            joined_at_ms: 1_700_000_000_000,
            outbox,
        };
        (participant, rx)
    }

    pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut received = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            received.push(msg);
        }
        received
    }
}

#[cfg(test)]
mod success {
    use super::test_helper_fn::{drain, participant};
    use super::RoomRegistryHandle;
    use crate::protocol::{NegotiationPayload, ServerMessage};
    use crate::room::state::JoinOutcome;
    use crate::types::{PeerId, RoomId, SessionId};

    #[tokio::test]
    async fn first_join_has_no_broadcast() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, mut rx1) = participant(1, "p1", "Ana");

        let outcome = registry.join("abc".into(), p1).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Inserted);
        let members = registry.members("abc".into()).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].peer_id, PeerId::from("p1"));
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn second_join_is_announced_to_existing_member() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, mut rx1) = participant(1, "p1", "Ana");
        let (p2, mut rx2) = participant(2, "p2", "Stranger");

        registry.join("abc".into(), p1).await.unwrap();
        registry.join("abc".into(), p2).await.unwrap();

        assert_eq!(
            drain(&mut rx1),
            vec![ServerMessage::UserConnected {
                participant_id: "p2".into(),
                name: "Stranger".to_string(),
            }]
        );
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn repeated_join_merges_without_rebroadcast() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, mut rx1) = participant(1, "p1", "Ana");
        let (p2, _rx2) = participant(2, "p2", "Ben");
        let (p2_again, _rx2b) = participant(3, "p2", "Ben");

        registry.join("abc".into(), p1).await.unwrap();
        registry.join("abc".into(), p2).await.unwrap();
        let outcome = registry.join("abc".into(), p2_again).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Merged);
        assert_eq!(registry.members("abc".into()).await.unwrap().len(), 2);
        assert_eq!(drain(&mut rx1).len(), 1);
    }

    #[tokio::test]
    async fn membership_tracks_join_and_leave_sequence() {
        let registry = RoomRegistryHandle::spawn();
        let mut receivers = Vec::new();
        for (session, peer) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            let (p, rx) = participant(session, peer, peer);
            receivers.push(rx);
            registry.join("abc".into(), p).await.unwrap();
        }
        registry.leave("abc".into(), SessionId(2)).await.unwrap();
        registry.leave("abc".into(), SessionId(4)).await.unwrap();
        let (b_again, _rx) = participant(5, "b", "b");
        registry.join("abc".into(), b_again).await.unwrap();

        let mut peers: Vec<_> = registry
            .members("abc".into())
            .await
            .unwrap()
            .into_iter()
            .map(|m| (m.session_id, m.peer_id))
            .collect();
        peers.sort();
        assert_eq!(
            peers,
            vec![
                (SessionId(1), PeerId::from("a")),
                (SessionId(3), PeerId::from("c")),
                (SessionId(5), PeerId::from("b")),
            ]
        );
    }

    #[tokio::test]
    async fn leave_is_announced_once() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, mut rx1) = participant(1, "p1", "Ana");
        let (p2, _rx2) = participant(2, "p2", "Ben");
        registry.join("abc".into(), p1).await.unwrap();
        registry.join("abc".into(), p2).await.unwrap();
        drain(&mut rx1);

        assert!(registry.leave("abc".into(), SessionId(2)).await.unwrap());
        assert!(!registry.leave("abc".into(), SessionId(2)).await.unwrap());

        assert_eq!(
            drain(&mut rx1),
            vec![ServerMessage::UserDisconnected {
                participant_id: "p2".into()
            }]
        );
    }

    #[tokio::test]
    async fn joins_and_leaves_arrive_in_processing_order() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, mut rx1) = participant(1, "p1", "Ana");
        registry.join("abc".into(), p1).await.unwrap();

        let (p2, _rx2) = participant(2, "p2", "Ben");
        let (p3, _rx3) = participant(3, "p3", "Cy");
        registry.join("abc".into(), p2).await.unwrap();
        registry.leave("abc".into(), SessionId(2)).await.unwrap();
        registry.join("abc".into(), p3).await.unwrap();

        let ids: Vec<_> = drain(&mut rx1)
            .into_iter()
            .map(|msg| match msg {
                ServerMessage::UserConnected { participant_id, .. } => format!("+{participant_id}"),
                ServerMessage::UserDisconnected { participant_id } => format!("-{participant_id}"),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["+p2", "-p2", "+p3"]);
    }

    #[tokio::test]
    async fn chat_is_room_scoped() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, _rx1) = participant(1, "p1", "Ana");
        let (p2, mut rx2) = participant(2, "p2", "Ben");
        let (p3, mut rx3) = participant(3, "p3", "Cy");
        registry.join("abc".into(), p1).await.unwrap();
        registry.join("abc".into(), p2).await.unwrap();
        registry.join("xyz".into(), p3).await.unwrap();
        drain(&mut rx2);

        let delivered = registry
            .chat("abc".into(), SessionId(1), "hello".to_string())
            .await
            .unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(
            drain(&mut rx2),
            vec![ServerMessage::Chat {
                name: "Ana".to_string(),
                text: "hello".to_string()
            }]
        );
        assert!(drain(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn signal_does_not_cross_rooms() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, _rx1) = participant(1, "p1", "Ana");
        let (p3, mut rx3) = participant(3, "p3", "Cy");
        registry.join("abc".into(), p1).await.unwrap();
        registry.join("xyz".into(), p3).await.unwrap();

        let forwarded = registry
            .signal(
                "abc".into(),
                SessionId(1),
                "p3".into(),
                NegotiationPayload::Offer { sdp: "v=0".into() },
            )
            .await
            .unwrap();

        assert!(!forwarded);
        assert!(drain(&mut rx3).is_empty());
    }

    #[tokio::test]
    async fn empty_room_is_dropped() {
        let registry = RoomRegistryHandle::spawn();
        let (p1, _rx1) = participant(1, "p1", "Ana");
        let room: RoomId = "abc".into();
        registry.join(room.clone(), p1).await.unwrap();
        assert_eq!(registry.room_count().await.unwrap(), 1);

        registry.leave(room.clone(), SessionId(1)).await.unwrap();

        assert_eq!(registry.room_count().await.unwrap(), 0);
        assert!(registry.members(room).await.unwrap().is_empty());
    }
}
