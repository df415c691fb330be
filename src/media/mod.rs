#[cfg(feature = "native-audio")]
pub mod audio;
pub mod controller;
pub mod devices;
pub mod track;

#[cfg(feature = "native-audio")]
pub use audio::CpalDevices;
pub use controller::LocalMediaController;
pub use devices::{CaptureDevices, DeviceInfo, DeviceKind, HeadlessDevices, MediaConstraints, UserMedia};
pub use track::{LocalTrack, OutgoingTracks, TrackSource};
