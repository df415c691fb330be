//! Server-side membership: the registry actor, its handle and the relay that
//! fans events out to a room.

pub(crate) mod commands;
pub mod handle;
pub(crate) mod registry;
pub(crate) mod relay;
pub mod state;

pub use handle::RoomRegistryHandle;
pub use state::{JoinOutcome, Participant, ParticipantInfo};
