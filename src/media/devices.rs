use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::media::track::{LocalTrack, TrackSource};
use crate::types::MediaKind;

/// Opus frame carrying 20 ms of silence.
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
/// Not a decodable picture, only enough to keep RTP flowing.
const VP8_FILLER: [u8; 10] = [0x10, 0x02, 0x00, 0x9d, 0x01, 0x2a, 0x10, 0x00, 0x10, 0x00];
const AUDIO_FRAME: Duration = Duration::from_millis(20);
const VIDEO_FRAME: Duration = Duration::from_millis(33);

/// Feeds synthetic frames to `track` until it ends. Muted tracks drop
/// them in `write_sample`.
pub fn spawn_synthetic_source(track: &LocalTrack) -> tokio::task::JoinHandle<()> {
    let track = track.clone();
    let (payload, frame) = match track.kind() {
        MediaKind::Audio => (Bytes::from_static(&OPUS_SILENCE), AUDIO_FRAME),
        MediaKind::Video => (Bytes::from_static(&VP8_FILLER), VIDEO_FRAME),
    };
    let mut ended = track.ended_signal();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(frame);
        loop {
            tokio::select! {
                _ = async { let _ = ended.wait_for(|ended| *ended).await; } => break,
                _ = ticker.tick() => {
                    if let Err(err) = track.write_sample(payload.clone(), frame).await {
                        tracing::debug!("{}: dropped synthetic frame: {}", track.id(), err);
                    }
                }
            }
        }
        tracing::trace!("{}: synthetic source stopped", track.id());
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    VideoInput,
    AudioOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub kind: DeviceKind,
    pub label: String,
}

impl DeviceInfo {
    pub fn new(kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

/// Which kinds to ask the capture backend for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Only kinds some physical device provides, so no needless prompts.
    pub fn from_devices(devices: &[DeviceInfo]) -> Self {
        Self {
            audio: devices.iter().any(|d| d.kind == DeviceKind::AudioInput),
            video: devices.iter().any(|d| d.kind == DeviceKind::VideoInput),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.audio && !self.video
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserMedia {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

#[async_trait]
pub trait CaptureDevices: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>>;
    async fn user_media(&self, constraints: MediaConstraints) -> Result<UserMedia>;
    async fn display_media(&self) -> Result<LocalTrack>;
}

/// Synthetic devices for headless participants. Tracks are real webrtc-rs
/// sample tracks fed with silence and filler frames.
#[derive(Debug, Clone)]
pub struct HeadlessDevices {
    audio: bool,
    video: bool,
}

impl HeadlessDevices {
    pub fn new(audio: bool, video: bool) -> Self {
        Self { audio, video }
    }
}

#[async_trait]
impl CaptureDevices for HeadlessDevices {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let mut devices = Vec::new();
        if self.audio {
            devices.push(DeviceInfo::new(DeviceKind::AudioInput, "headless microphone"));
        }
        if self.video {
            devices.push(DeviceInfo::new(DeviceKind::VideoInput, "headless camera"));
        }
        Ok(devices)
    }

    async fn user_media(&self, constraints: MediaConstraints) -> Result<UserMedia> {
        if (constraints.audio && !self.audio) || (constraints.video && !self.video) {
            return Err(Error::Capture("requested device is not present".to_string()));
        }
        let media = UserMedia {
            audio: constraints
                .audio
                .then(|| LocalTrack::new(TrackSource::Microphone)),
            video: constraints.video.then(|| LocalTrack::new(TrackSource::Camera)),
        };
        for track in media.audio.iter().chain(media.video.iter()) {
            spawn_synthetic_source(track);
        }
        Ok(media)
    }

    async fn display_media(&self) -> Result<LocalTrack> {
        let screen = LocalTrack::new(TrackSource::Screen);
        spawn_synthetic_source(&screen);
        Ok(screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_only_request_present_kinds() {
        let devices = vec![
            DeviceInfo::new(DeviceKind::AudioInput, "mic"),
            DeviceInfo::new(DeviceKind::AudioOutput, "speakers"),
        ];
        let constraints = MediaConstraints::from_devices(&devices);
        assert!(constraints.audio);
        assert!(!constraints.video);

        assert!(MediaConstraints::from_devices(&[]).is_empty());
    }

    #[tokio::test]
    async fn headless_devices_match_configuration() {
        let devices = HeadlessDevices::new(true, false);
        let found = devices.enumerate().await.unwrap();
        assert_eq!(found.len(), 1);

        let media = devices
            .user_media(MediaConstraints::from_devices(&found))
            .await
            .unwrap();
        assert!(media.audio.is_some());
        assert!(media.video.is_none());

        let refused = devices
            .user_media(MediaConstraints {
                audio: true,
                video: true,
            })
            .await;
        assert!(matches!(refused, Err(Error::Capture(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_source_stops_with_track() {
        let track = LocalTrack::new(TrackSource::Microphone);
        let source = spawn_synthetic_source(&track);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!source.is_finished());

        track.stop();
        source.await.unwrap();
    }
}
