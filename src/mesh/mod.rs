pub mod connection;
#[cfg(test)]
pub(crate) mod fake;
pub mod manager;
pub mod negotiator;
pub mod rtc;

pub use connection::{ConnectionState, Direction, MediaConnection};
pub use manager::PeerMeshManager;
pub use negotiator::{LinkNotifier, MediaLink, MeshEvent, MeshEventReceiver, MeshEventSender, Negotiator};
pub use rtc::RtcNegotiator;
