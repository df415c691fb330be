pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod media;
pub mod mesh;
pub mod protocol;
pub mod room;
pub mod server;
pub mod signaling;
pub mod types;

pub use client::{ClientSession, Control, SessionEvent};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, NegotiationPayload, ServerMessage};
pub use types::{MediaKind, PeerId, RoomId, SessionId};
