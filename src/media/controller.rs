use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::media::devices::{CaptureDevices, MediaConstraints};
use crate::media::track::{LocalTrack, OutgoingTracks};
use crate::mesh::PeerMeshManager;

/// Local capture tracks of one participant. Changes that affect what peers
/// receive are pushed through the mesh.
pub struct LocalMediaController {
    devices: Arc<dyn CaptureDevices>,
    audio: Option<LocalTrack>,
    camera: Option<LocalTrack>,
    screen: Option<LocalTrack>,
}

impl LocalMediaController {
    /// Enumerates devices and captures every kind at least one of them
    /// provides.
    pub async fn acquire(devices: Arc<dyn CaptureDevices>) -> Result<Self> {
        let found = devices.enumerate().await?;
        let constraints = MediaConstraints::from_devices(&found);
        if constraints.is_empty() {
            return Err(Error::NoCaptureDevice);
        }

        let media = devices.user_media(constraints).await?;
        tracing::info!(
            "capturing audio: {}, video: {}",
            media.audio.is_some(),
            media.video.is_some()
        );
        Ok(Self {
            devices,
            audio: media.audio,
            camera: media.video,
            screen: None,
        })
    }

    pub fn audio(&self) -> Option<&LocalTrack> {
        self.audio.as_ref()
    }

    pub fn camera(&self) -> Option<&LocalTrack> {
        self.camera.as_ref()
    }

    pub fn screen(&self) -> Option<&LocalTrack> {
        self.screen.as_ref()
    }

    /// Tracks for new connections: the screen replaces the camera while
    /// sharing.
    pub fn outgoing_tracks(&self) -> OutgoingTracks {
        OutgoingTracks {
            audio: self.audio.clone(),
            video: self.screen.clone().or_else(|| self.camera.clone()),
        }
    }

    /// Flips the microphone. Returns whether audio is now enabled, or `None`
    /// without a microphone.
    pub fn toggle_mute(&self) -> Option<bool> {
        let audio = self.audio.as_ref()?;
        let enabled = !audio.is_enabled();
        audio.set_enabled(enabled);
        Some(enabled)
    }

    /// Flips the camera. Returns whether video is now enabled, or `None`
    /// without a camera.
    pub fn toggle_camera(&self) -> Option<bool> {
        let camera = self.camera.as_ref()?;
        let enabled = !camera.is_enabled();
        camera.set_enabled(enabled);
        Some(enabled)
    }

    pub fn is_sharing(&self) -> bool {
        self.screen.is_some()
    }

    /// Captures the display and swaps it in on every live connection.
    /// Returns how many senders were swapped.
    pub async fn start_screen_share(&mut self, mesh: &mut PeerMeshManager) -> Result<usize> {
        if self.is_sharing() {
            return Ok(0);
        }
        let screen = self.devices.display_media().await?;
        self.screen = Some(screen.clone());
        let replaced = mesh.replace_outgoing_video(Some(screen)).await;
        tracing::info!("screen share started");
        Ok(replaced)
    }

    /// Back to the camera, or to no video without one. Releases the display
    /// capture. No-op when not sharing.
    pub async fn stop_screen_share(&mut self, mesh: &mut PeerMeshManager) -> usize {
        let Some(screen) = self.screen.take() else {
            return 0;
        };
        let replaced = mesh.replace_outgoing_video(self.camera.clone()).await;
        screen.stop();
        tracing::info!("screen share stopped");
        replaced
    }

    /// Returns whether sharing is on afterwards.
    pub async fn toggle_screen_share(&mut self, mesh: &mut PeerMeshManager) -> Result<bool> {
        if self.is_sharing() {
            self.stop_screen_share(mesh).await;
        } else {
            self.start_screen_share(mesh).await?;
        }
        Ok(self.is_sharing())
    }

    /// Fires when the display capture ends, including from outside the
    /// application.
    pub fn screen_ended_signal(&self) -> Option<watch::Receiver<bool>> {
        self.screen.as_ref().map(LocalTrack::ended_signal)
    }

    pub fn release(&mut self) {
        for track in [self.audio.take(), self.camera.take(), self.screen.take()]
            .into_iter()
            .flatten()
        {
            track.stop();
        }
    }
}
