use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::Result;
use crate::types::MediaKind;

const STREAM_ID: &str = "meshroom-local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
}

impl TrackSource {
    pub fn kind(self) -> MediaKind {
        match self {
            TrackSource::Microphone => MediaKind::Audio,
            TrackSource::Camera | TrackSource::Screen => MediaKind::Video,
        }
    }
}

impl fmt::Display for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::Microphone => write!(f, "microphone"),
            TrackSource::Camera => write!(f, "camera"),
            TrackSource::Screen => write!(f, "screen"),
        }
    }
}

struct TrackInner {
    id: String,
    source: TrackSource,
    enabled: AtomicBool,
    ended: watch::Sender<bool>,
    rtc: Arc<TrackLocalStaticSample>,
}

/// A local capture track. Clones share state; equality is by id.
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<TrackInner>,
}

impl LocalTrack {
    /// Opus for audio, VP8 for video.
    pub fn new(source: TrackSource) -> Self {
        let mime_type = match source.kind() {
            MediaKind::Audio => MIME_TYPE_OPUS,
            MediaKind::Video => MIME_TYPE_VP8,
        };
        Self::with_mime_type(source, mime_type)
    }

    pub fn with_mime_type(source: TrackSource, mime_type: &str) -> Self {
        let id = format!("{}-{:08x}", source, rand::random::<u32>());
        let rtc = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            id.clone(),
            STREAM_ID.to_owned(),
        ));
        let (ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(TrackInner {
                id,
                source,
                enabled: AtomicBool::new(true),
                ended,
                rtc,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.source.kind()
    }

    pub fn source(&self) -> TrackSource {
        self.inner.source
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Capture keeps running; disabled tracks just stop emitting samples.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Ends the track. Also how a capture backend reports that the source
    /// went away on its own, e.g. a display share stopped from outside.
    pub fn stop(&self) {
        self.inner.ended.send_replace(true);
    }

    pub fn is_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    pub fn ended_signal(&self) -> watch::Receiver<bool> {
        self.inner.ended.subscribe()
    }

    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        Arc::clone(&self.inner.rtc) as Arc<dyn TrackLocal + Send + Sync>
    }

    /// Feeds one encoded frame to every connection sending this track.
    /// Returns false when the frame was dropped because the track is muted
    /// or ended.
    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<bool> {
        if !self.is_enabled() || self.is_ended() {
            return Ok(false);
        }
        let sample = Sample {
            data,
            duration,
            ..Default::default()
        };
        self.inner.rtc.write_sample(&sample).await?;
        Ok(true)
    }
}

impl PartialEq for LocalTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for LocalTrack {}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// What a new connection is given: at most one audio and one video track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingTracks {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl OutgoingTracks {
    pub fn iter(&self) -> impl Iterator<Item = &LocalTrack> {
        self.audio.iter().chain(self.video.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

    #[test]
    fn kind_follows_source() {
        let mic = LocalTrack::new(TrackSource::Microphone);
        let screen = LocalTrack::new(TrackSource::Screen);
        assert_eq!(mic.kind(), MediaKind::Audio);
        assert_eq!(screen.kind(), MediaKind::Video);
        assert_eq!(screen.rtc_track().kind(), RTPCodecType::Video);
        assert_eq!(screen.rtc_track().id(), screen.id());
    }

    #[test]
    fn clones_share_enabled_flag() {
        let cam = LocalTrack::new(TrackSource::Camera);
        let other = cam.clone();
        cam.set_enabled(false);
        assert!(!other.is_enabled());
        assert_eq!(cam, other);
        assert_ne!(cam, LocalTrack::new(TrackSource::Camera));
    }

    #[tokio::test]
    async fn muted_or_ended_track_drops_samples() {
        let mic = LocalTrack::new(TrackSource::Microphone);
        mic.set_enabled(false);
        let written = mic
            .write_sample(Bytes::from_static(&[0u8; 4]), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!written);

        mic.set_enabled(true);
        mic.stop();
        let written = mic
            .write_sample(Bytes::from_static(&[0u8; 4]), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn stop_fires_ended_signal() {
        let screen = LocalTrack::new(TrackSource::Screen);
        let mut ended = screen.ended_signal();
        screen.stop();
        assert!(ended.wait_for(|ended| *ended).await.is_ok());
        assert!(screen.is_ended());
    }
}
