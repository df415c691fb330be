use crate::mesh::connection::{ConnectionEvent, ConnectionState};
use crate::types::PeerId;
use anyhow::Error as AnyhowError;
use tokio_tungstenite::tungstenite::Error as WsError;
use webrtc::Error as WebRTCError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("WebRTC error: {0}")]
    WebRTC(#[from] WebRTCError),
    #[error("WebSocket error: {0}")]
    Ws(#[from] WsError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signaling channel closed")]
    ChannelClosed,
    #[error("room registry is not running")]
    RegistryUnavailable,
    #[error("no camera or microphone found")]
    NoCaptureDevice,
    #[error("could not access capture device: {0}")]
    Capture(String),
    #[error("connection to {peer_id} cannot handle {event} while {from}")]
    InvalidTransition {
        peer_id: PeerId,
        from: ConnectionState,
        event: ConnectionEvent,
    },
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

pub type Result<T> = std::result::Result<T, Error>;
