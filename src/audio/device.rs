//! Host audio devices through cpal (`desktop-audio` feature).
//!
//! A `cpal::Stream` cannot move between threads, so each stream is built on
//! and owned by a dedicated thread that keeps it alive until stopped. The
//! session only holds the channel that ends that thread.

use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, FrameAssembler};
use super::mixer::{OutputRenderer, PlaybackMixer};
use super::output::{AudioOutput, ChunkId, OutputDevice, PlaybackChunk};
use crate::error::{LiveError, Result};

/// Thread that owns a running cpal stream
struct StreamThread {
    stop: Option<oneshot::Sender<()>>,
}

impl StreamThread {
    /// Build and play a stream on its own thread. `ready` receives the
    /// outcome of building it.
    fn spawn<T, F>(name: &str, build: F) -> Result<(Self, std_mpsc::Receiver<Result<T>>)>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<(cpal::Stream, T)> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let (stream, value) = match build() {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(LiveError::acquisition(format!(
                        "failed to start stream: {}",
                        e
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(value));

                // Resolves on stop or when the owner is dropped
                let _ = stop_rx.blocking_recv();
                drop(stream);
                debug!("Audio stream thread finished");
            })
            .map_err(|e| LiveError::acquisition(format!("failed to spawn audio thread: {}", e)))?;

        Ok((Self { stop: Some(stop_tx) }, ready_rx))
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unsupported(format: SampleFormat) -> LiveError {
    LiveError::acquisition(format!("unsupported sample format {:?}", format))
}

// ============================================================================
// Capture
// ============================================================================

/// Microphone capture from the host's default input device
pub struct CpalBackend {
    config: AudioBackendConfig,
    stream: Option<StreamThread>,
}

impl CpalBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }
}

fn open_input(
    config: AudioBackendConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, ())> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| LiveError::acquisition("no default input device available"))?;
    let name = device.name().unwrap_or_else(|_| "unknown".into());

    let supported = device
        .default_input_config()
        .map_err(|e| LiveError::acquisition(format!("microphone unavailable: {}", e)))?;
    let format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();

    info!(
        device = %name,
        rate = stream_config.sample_rate.0,
        channels = stream_config.channels,
        "Selected input device"
    );

    let assembler = FrameAssembler::new(
        tx,
        &config,
        stream_config.sample_rate.0,
        stream_config.channels,
    );

    let stream = match format {
        SampleFormat::F32 => build_input::<f32>(&device, &stream_config, assembler),
        SampleFormat::I16 => build_input::<i16>(&device, &stream_config, assembler),
        SampleFormat::U16 => build_input::<u16>(&device, &stream_config, assembler),
        other => Err(unsupported(other)),
    }?;
    Ok((stream, ()))
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut assembler: FrameAssembler,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut buffer: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                buffer.clear();
                buffer.extend(data.iter().map(|s| f32::from_sample(*s)));
                assembler.push(&buffer);
            },
            |err| error!("Audio input stream error: {}", err),
            None,
        )
        .map_err(|e| LiveError::acquisition(format!("failed to build input stream: {}", e)))
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.stream.is_some() {
            return Err(LiveError::acquisition("microphone capture already running"));
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let config = self.config.clone();
        let (stream, ready) = StreamThread::spawn("audio-capture", move || open_input(config, tx))?;

        tokio::task::spawn_blocking(move || ready.recv())
            .await
            .map_err(|e| LiveError::acquisition(format!("capture thread failed: {}", e)))?
            .map_err(|_| LiveError::acquisition("capture thread exited before starting"))??;

        self.stream = Some(stream);
        info!("Microphone capture started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

// ============================================================================
// Playback
// ============================================================================

/// Opens playback on the host's default output device
#[derive(Default)]
pub struct CpalOutputDevice;

impl CpalOutputDevice {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDevice for CpalOutputDevice {
    fn open(
        &mut self,
        sample_rate: u32,
        finished: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>> {
        let mixer = Arc::new(Mutex::new(PlaybackMixer::new()));
        let shared = mixer.clone();

        let (stream, ready) = StreamThread::spawn("audio-playback", move || {
            open_output(shared, finished, sample_rate)
        })?;
        let device_rate = ready
            .recv()
            .map_err(|_| LiveError::acquisition("playback thread exited before starting"))??;

        info!("Speaker playback opened ({}Hz source, {}Hz device)", sample_rate, device_rate);
        Ok(Box::new(CpalOutput {
            mixer,
            sample_rate,
            stream: Some(stream),
        }))
    }
}

fn open_output(
    mixer: Arc<Mutex<PlaybackMixer>>,
    finished: mpsc::UnboundedSender<ChunkId>,
    sample_rate: u32,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| LiveError::acquisition("no default output device available"))?;
    let name = device.name().unwrap_or_else(|_| "unknown".into());

    let supported = device
        .default_output_config()
        .map_err(|e| LiveError::acquisition(format!("speaker unavailable: {}", e)))?;
    let format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    let device_rate = stream_config.sample_rate.0;

    info!(
        device = %name,
        rate = device_rate,
        channels = stream_config.channels,
        "Selected output device"
    );

    let renderer = OutputRenderer::new(
        mixer,
        finished,
        sample_rate,
        device_rate,
        stream_config.channels,
    );

    let stream = match format {
        SampleFormat::F32 => build_output::<f32>(&device, &stream_config, renderer),
        SampleFormat::I16 => build_output::<i16>(&device, &stream_config, renderer),
        SampleFormat::U16 => build_output::<u16>(&device, &stream_config, renderer),
        other => Err(unsupported(other)),
    }?;
    Ok((stream, device_rate))
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: OutputRenderer,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut buffer: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                buffer.resize(data.len(), 0.0);
                renderer.fill(&mut buffer);
                for (slot, sample) in data.iter_mut().zip(&buffer) {
                    *slot = T::from_sample(*sample);
                }
            },
            |err| error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| LiveError::acquisition(format!("failed to build output stream: {}", e)))
}

/// Plays chunks through the device; the clock is the rendered position.
pub struct CpalOutput {
    mixer: Arc<Mutex<PlaybackMixer>>,
    sample_rate: u32,
    stream: Option<StreamThread>,
}

impl CpalOutput {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PlaybackMixer>> {
        self.mixer
            .lock()
            .map_err(|_| LiveError::output("playback mixer poisoned"))
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.lock()
            .map(|mixer| mixer.position() as f64 / self.sample_rate as f64)
            .unwrap_or(0.0)
    }

    fn play(&mut self, chunk: &PlaybackChunk) -> Result<()> {
        if self.stream.is_none() {
            return Err(LiveError::output("playback context already closed"));
        }
        let start = (chunk.start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        self.lock()?.add(chunk.id, start, chunk.samples.clone());
        Ok(())
    }

    fn stop(&mut self, id: ChunkId) {
        if let Ok(mut mixer) = self.lock() {
            if mixer.remove(id) {
                debug!("Stopped chunk {}", id);
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            self.lock()?.clear();
            info!("Speaker playback closed");
        }
        Ok(())
    }
}
