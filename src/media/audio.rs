use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::{mpsc, oneshot};
use webrtc::api::media_engine::MIME_TYPE_PCMU;

use crate::error::{Error, Result};
use crate::media::devices::{CaptureDevices, DeviceInfo, DeviceKind, MediaConstraints, UserMedia};
use crate::media::track::{LocalTrack, TrackSource};

const PCMU_RATE: u32 = 8000;
/// 20 ms at 8 kHz, one byte per sample.
const PCMU_FRAME_BYTES: usize = 160;
const PCMU_FRAME: Duration = Duration::from_millis(20);

/// Device catalog and microphone capture backed by the platform audio host.
/// Only audio devices are visible, so video is never requested from it.
#[derive(Debug, Default, Clone)]
pub struct CpalDevices;

impl CpalDevices {
    pub fn new() -> Self {
        Self
    }
}

fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let inputs = host
        .input_devices()
        .map_err(|e| Error::Capture(e.to_string()))?;
    for device in inputs {
        let label = device.name().unwrap_or_else(|_| "unnamed input".to_string());
        devices.push(DeviceInfo::new(DeviceKind::AudioInput, label));
    }

    let outputs = host
        .output_devices()
        .map_err(|e| Error::Capture(e.to_string()))?;
    for device in outputs {
        let label = device.name().unwrap_or_else(|_| "unnamed output".to_string());
        devices.push(DeviceInfo::new(DeviceKind::AudioOutput, label));
    }

    Ok(devices)
}

/// G.711 mu-law encoding of one sample in [-1, 1].
fn encode_ulaw(sample: f32) -> u8 {
    const BIAS: i32 = 0x84;
    const CLIP: i32 = 32635;

    let mut pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };
    pcm = pcm.min(CLIP) + BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0f;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Mixes interleaved frames down to mono 8 kHz mu-law and cuts the result
/// into 20 ms packets.
struct PcmuEncoder {
    channels: usize,
    step: f64,
    phase: f64,
    sum: f32,
    count: u32,
    frame: Vec<u8>,
}

impl PcmuEncoder {
    fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            channels: usize::from(channels.max(1)),
            step: f64::from(sample_rate) / f64::from(PCMU_RATE),
            phase: 0.0,
            sum: 0.0,
            count: 0,
            frame: Vec::with_capacity(PCMU_FRAME_BYTES),
        }
    }

    fn push(&mut self, interleaved: &[f32], mut emit: impl FnMut(Bytes)) {
        for frame in interleaved.chunks(self.channels) {
            self.sum += frame.iter().sum::<f32>() / frame.len() as f32;
            self.count += 1;
            self.phase += 1.0;
            if self.phase < self.step {
                continue;
            }
            self.phase -= self.step;
            self.frame.push(encode_ulaw(self.sum / self.count as f32));
            self.sum = 0.0;
            self.count = 0;
            if self.frame.len() == PCMU_FRAME_BYTES {
                let packet = std::mem::replace(&mut self.frame, Vec::with_capacity(PCMU_FRAME_BYTES));
                emit(Bytes::from(packet));
            }
        }
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    packets: mpsc::UnboundedSender<Bytes>,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let mut encoder = PcmuEncoder::new(config.sample_rate.0, config.channels);
    let mut mono = Vec::new();
    let err_fn = |err| tracing::warn!("input audio stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.iter().map(|sample| f32::from_sample(*sample)));
                encoder.push(&mono, |packet| {
                    let _ = packets.send(packet);
                });
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::Capture(e.to_string()))
}

fn open_microphone(packets: mpsc::UnboundedSender<Bytes>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Capture("no input device available".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| Error::Capture(e.to_string()))?;
    tracing::info!("input config: {:?}", supported);

    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let stream = match format {
        SampleFormat::F32 => build_input_stream::<f32>(&device, &config, packets)?,
        SampleFormat::I16 => build_input_stream::<i16>(&device, &config, packets)?,
        SampleFormat::U16 => build_input_stream::<u16>(&device, &config, packets)?,
        other => {
            return Err(Error::Capture(format!("unsupported sample format: {other:?}")));
        }
    };
    stream.play().map_err(|e| Error::Capture(e.to_string()))?;
    Ok(stream)
}

/// Captures the default microphone into `track` until the track ends. The
/// cpal stream is not `Send`, so it lives on its own thread.
async fn start_capture(track: &LocalTrack) -> Result<()> {
    let (packets_tx, mut packets_rx) = mpsc::unbounded_channel::<Bytes>();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
    let mut ended = track.ended_signal();

    std::thread::Builder::new()
        .name("meshroom-capture".to_string())
        .spawn(move || {
            let stream = match open_microphone(packets_tx) {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));
            let _ = futures::executor::block_on(ended.wait_for(|ended| *ended));
            drop(stream);
            tracing::debug!("microphone capture stopped");
        })
        .map_err(|e| Error::Capture(e.to_string()))?;

    ready_rx
        .await
        .map_err(|_| Error::Capture("capture thread exited".to_string()))??;

    let track = track.clone();
    tokio::spawn(async move {
        while let Some(packet) = packets_rx.recv().await {
            if let Err(err) = track.write_sample(packet, PCMU_FRAME).await {
                tracing::warn!("failed to write audio sample: {}", err);
            }
        }
    });
    Ok(())
}

#[async_trait]
impl CaptureDevices for CpalDevices {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>> {
        let devices = tokio::task::spawn_blocking(list_devices)
            .await
            .map_err(|e| Error::Capture(e.to_string()))??;
        tracing::debug!("{} audio device(s) on {}", devices.len(), cpal::default_host().id().name());
        Ok(devices)
    }

    async fn user_media(&self, constraints: MediaConstraints) -> Result<UserMedia> {
        if constraints.video {
            return Err(Error::Capture("no video capture on this host".to_string()));
        }
        if !constraints.audio {
            return Ok(UserMedia::default());
        }

        let microphone = LocalTrack::with_mime_type(TrackSource::Microphone, MIME_TYPE_PCMU);
        start_capture(&microphone).await?;
        Ok(UserMedia {
            audio: Some(microphone),
            video: None,
        })
    }

    async fn display_media(&self) -> Result<LocalTrack> {
        Err(Error::Capture("display capture is not available".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulaw_reference_points() {
        assert_eq!(encode_ulaw(0.0), 0xff);
        assert_eq!(encode_ulaw(1.0), 0x80);
        assert_eq!(encode_ulaw(-1.0), 0x00);
    }

    #[test]
    fn encoder_emits_20ms_packets_at_8khz() {
        let mut encoder = PcmuEncoder::new(48_000, 2);
        let mut packets = Vec::new();
        // 40 ms of stereo silence at 48 kHz.
        let input = vec![0.0f32; 48 * 40 * 2];
        encoder.push(&input, |packet| packets.push(packet));

        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.len() == PCMU_FRAME_BYTES));
        assert!(packets[0].iter().all(|b| *b == 0xff));
    }
}
