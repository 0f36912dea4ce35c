use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

use super::file::FileBackend;
use super::mixer::resample_linear;
use super::output::{OutputDevice, WavOutputDevice};
use super::pcm::{CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE};
use crate::error::Result;

/// One captured block of mono samples (nominally in [-1.0, 1.0])
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio capture
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Capture sample rate
    pub sample_rate: u32,
    /// Samples per delivered frame
    pub block_size: usize,
    /// Frames buffered between the device and the session loop
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: INPUT_SAMPLE_RATE, // 16kHz for the live endpoint
            block_size: CAPTURE_BLOCK_SIZE, // 256ms at 16kHz
            channel_capacity: 32,
        }
    }
}

/// Audio capture backend trait
///
/// A backend is reusable: `start` may be called again after `stop`.
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. Fails with
    /// [`crate::LiveError::Acquisition`] when the device cannot be opened.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the device. Safe to call when not capturing.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::File(path) => Ok(Box::new(FileBackend::new(path, config))),
            #[cfg(feature = "desktop-audio")]
            AudioSource::Microphone => Ok(Box::new(super::device::CpalBackend::new(config))),
            #[cfg(not(feature = "desktop-audio"))]
            AudioSource::Microphone => Err(crate::error::LiveError::acquisition(
                "microphone capture needs the desktop-audio feature; configure audio.input = \"file\"",
            )),
        }
    }

    pub fn create_output(sink: AudioSink) -> Result<Box<dyn OutputDevice>> {
        match sink {
            AudioSink::Wav(path) => Ok(Box::new(WavOutputDevice::new(path))),
            #[cfg(feature = "desktop-audio")]
            AudioSink::Speaker => Ok(Box::new(super::device::CpalOutputDevice::new())),
            #[cfg(not(feature = "desktop-audio"))]
            AudioSink::Speaker => Err(crate::error::LiveError::acquisition(
                "speaker playback needs the desktop-audio feature; configure audio.output = \"wav\"",
            )),
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Default input device of the host
    Microphone,
    /// WAV file streamed in real time as if it were a microphone
    File(PathBuf),
}

/// Where model audio is played
#[derive(Debug, Clone)]
pub enum AudioSink {
    /// Default output device of the host
    Speaker,
    /// WAV file receiving everything that was played
    Wav(PathBuf),
}

/// Turns device callbacks of arbitrary size, rate and channel count into
/// fixed-size mono capture frames.
///
/// Frames are offered to the session without waiting: when the channel is
/// full the frame is dropped, so a slow consumer never stalls the device.
pub struct FrameAssembler {
    tx: mpsc::Sender<AudioFrame>,
    device_rate: u32,
    channels: u16,
    sample_rate: u32,
    block_size: usize,
    pending: Vec<f32>,
    emitted: u64,
    dropped: u64,
}

impl FrameAssembler {
    pub fn new(
        tx: mpsc::Sender<AudioFrame>,
        config: &AudioBackendConfig,
        device_rate: u32,
        channels: u16,
    ) -> Self {
        let block_size = config.block_size.max(1);
        Self {
            tx,
            device_rate,
            channels,
            sample_rate: config.sample_rate,
            block_size,
            pending: Vec::with_capacity(block_size * 2),
            emitted: 0,
            dropped: 0,
        }
    }

    /// Feed interleaved samples as delivered by the device
    pub fn push(&mut self, interleaved: &[f32]) {
        let mono = downmix(interleaved, self.channels);
        self.pending
            .extend(resample_linear(&mono, self.device_rate, self.sample_rate));

        while self.pending.len() >= self.block_size {
            let samples: Vec<f32> = self.pending.drain(..self.block_size).collect();
            let frame = AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                timestamp_ms: self.emitted * 1000 / self.sample_rate.max(1) as u64,
            };
            self.emitted += self.block_size as u64;

            if !offer_frame(&self.tx, frame) {
                self.dropped += 1;
            }
        }
    }

    /// Frames the consumer was not ready for
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Hand a frame over without waiting. Returns whether it was accepted.
pub(crate) fn offer_frame(tx: &mpsc::Sender<AudioFrame>, frame: AudioFrame) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(frame)) => {
            trace!("Capture channel full, dropping frame at {}ms", frame.timestamp_ms);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Average interleaved channels into one
pub(crate) fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
