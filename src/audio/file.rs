use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{downmix, offer_frame, AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{LiveError, Result};

/// A WAV file decoded to mono `f32` samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| LiveError::acquisition(format!("failed to open {}: {}", path.display(), e)))?;

        let spec = reader.spec();
        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, _) => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            (SampleFormat::Int, bits) => {
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| LiveError::acquisition(format!("failed to read audio samples: {}", e)))?;

        let samples = downmix(&interleaved, spec.channels);
        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Capture backend that streams a WAV file in real time, block by block.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_capturing() {
            return Err(LiveError::acquisition("file capture already running"));
        }

        let audio = AudioFile::open(&self.path)?;
        if audio.sample_rate != self.config.sample_rate {
            return Err(LiveError::acquisition(format!(
                "{} is {}Hz, capture expects {}Hz",
                audio.path, audio.sample_rate, self.config.sample_rate
            )));
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let block_size = self.config.block_size.max(1);
        let sample_rate = self.config.sample_rate;
        let block_duration = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_duration);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            for (index, block) in audio.samples.chunks(block_size).enumerate() {
                ticker.tick().await;

                let mut samples = block.to_vec();
                samples.resize(block_size, 0.0);

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    timestamp_ms: (index * block_size) as u64 * 1000 / sample_rate as u64,
                };
                if tx.is_closed() {
                    debug!("Capture receiver dropped, stopping file stream");
                    return;
                }
                // Dropped when the session is not keeping up
                offer_frame(&tx, frame);
            }
            info!("File capture reached end of input");
        });

        self.task = Some(task);
        info!("File capture started: {}", self.path.display());
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file"
    }
}
