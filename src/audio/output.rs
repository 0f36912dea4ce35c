//! Playback side of the live session.
//!
//! An [`OutputDevice`] opens one [`AudioOutput`] per session. The output owns
//! a playback clock and plays chunks at absolute clock times; when a chunk
//! finishes on its own the output reports its id on the `finished` channel
//! it was opened with.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hound::{SampleFormat, WavSpec, WavWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::mixer::PlaybackMixer;
use crate::error::{LiveError, Result};

/// Identifies a scheduled chunk within one session
pub type ChunkId = u64;

/// Decoded output audio with its scheduled start time
#[derive(Debug, Clone)]
pub struct PlaybackChunk {
    pub id: ChunkId,
    /// Mono samples in [-1.0, 1.0)
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// Playback clock time, in seconds, at which the chunk starts
    pub start_time: f64,
}

impl PlaybackChunk {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration()
    }
}

/// A playback context with its own clock
pub trait AudioOutput: Send {
    /// Current playback clock time in seconds
    fn current_time(&self) -> f64;

    /// Schedule a chunk to play at `chunk.start_time`
    fn play(&mut self, chunk: &PlaybackChunk) -> Result<()>;

    /// Stop a chunk immediately. Unknown or finished ids are ignored.
    fn stop(&mut self, id: ChunkId);

    /// Release the context
    fn close(&mut self) -> Result<()>;
}

/// Opens playback contexts
pub trait OutputDevice: Send {
    fn open(
        &mut self,
        sample_rate: u32,
        finished: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>>;
}

/// Output device that renders each session's playback onto a WAV timeline
pub struct WavOutputDevice {
    path: PathBuf,
}

impl WavOutputDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl OutputDevice for WavOutputDevice {
    fn open(
        &mut self,
        sample_rate: u32,
        finished: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>> {
        info!("Opening WAV playback timeline {} at {}Hz", self.path.display(), sample_rate);
        Ok(Box::new(WavOutput::create(&self.path, sample_rate, finished)?))
    }
}

/// Plays scheduled chunks against a wall clock and streams what has been
/// "heard" into a 16-bit WAV file. Only chunks still ahead of the clock are
/// kept in memory.
pub struct WavOutput {
    path: PathBuf,
    sample_rate: u32,
    opened_at: Instant,
    mixer: PlaybackMixer,
    writer: Option<WavWriter<BufWriter<File>>>,
    timers: HashMap<ChunkId, JoinHandle<()>>,
    finished: mpsc::UnboundedSender<ChunkId>,
}

impl WavOutput {
    pub fn create(
        path: impl Into<PathBuf>,
        sample_rate: u32,
        finished: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Self> {
        let path = path.into();
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)
            .map_err(|e| LiveError::output(format!("failed to create {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            sample_rate,
            opened_at: Instant::now(),
            mixer: PlaybackMixer::new(),
            writer: Some(writer),
            timers: HashMap::new(),
            finished,
        })
    }

    /// Samples held for chunks that have not played out yet
    pub fn buffered_samples(&self) -> usize {
        self.mixer.buffered_samples()
    }

    fn position(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Write everything up to `target` (in samples) to the file.
    fn advance_to(&mut self, target: u64) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let mut block = vec![0.0f32; RENDER_BLOCK];
        while self.mixer.position() < target {
            let len = (target - self.mixer.position()).min(RENDER_BLOCK as u64) as usize;
            // Completion is reported by the per-chunk timers
            let _ = self.mixer.render(&mut block[..len]);
            for sample in &block[..len] {
                writer
                    .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                    .map_err(|e| LiveError::output(format!("failed to write sample: {}", e)))?;
            }
        }
        Ok(())
    }

    fn advance_to_now(&mut self) -> Result<()> {
        let now = self.position(self.current_time());
        self.advance_to(now)
    }
}

/// Samples rendered per write pass
const RENDER_BLOCK: usize = 4800;

impl AudioOutput for WavOutput {
    fn current_time(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn play(&mut self, chunk: &PlaybackChunk) -> Result<()> {
        if self.writer.is_none() {
            return Err(LiveError::output("playback context already closed"));
        }

        let start = self.position(chunk.start_time);
        self.mixer.add(chunk.id, start, chunk.samples.clone());
        self.advance_to_now()?;

        let delay = (chunk.end_time() - self.current_time()).max(0.0);
        let finished = self.finished.clone();
        let id = chunk.id;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            let _ = finished.send(id);
        });
        self.timers.retain(|_, timer| !timer.is_finished());
        self.timers.insert(id, timer);
        Ok(())
    }

    fn stop(&mut self, id: ChunkId) {
        if let Some(timer) = self.timers.remove(&id) {
            timer.abort();
        }
        // What has been heard stays in the file, the rest is silenced
        if let Err(e) = self.advance_to_now() {
            warn!("Failed to write playback before stopping chunk {}: {}", id, e);
        }
        if self.mixer.remove(id) {
            debug!("Stopped chunk {} at sample {}", id, self.mixer.position());
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }

        // A closed context stops playing: nothing past the clock is written
        let result = self.advance_to_now();
        self.mixer.clear();
        let writer = self.writer.take();
        result?;

        if let Some(writer) = writer {
            writer
                .finalize()
                .map_err(|e| LiveError::output(format!("failed to finalize WAV: {}", e)))?;
        }

        info!(
            "Playback timeline written: {} ({:.1}s)",
            self.path.display(),
            self.mixer.position() as f64 / self.sample_rate as f64
        );
        Ok(())
    }
}
