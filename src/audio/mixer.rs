// Playback mixer shared by the output devices
//
// Chunks are placed on a sample timeline at their scheduled start. Rendering
// walks the timeline forward, mixes every chunk overlapping the rendered
// range (simple addition with clipping), and retires chunks once the
// timeline has passed their end. Only chunks that have not finished playing
// are held in memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::output::ChunkId;

struct Voice {
    start: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

#[derive(Default)]
pub struct PlaybackMixer {
    voices: BTreeMap<ChunkId, Voice>,
    /// Next sample to be rendered
    position: u64,
}

impl PlaybackMixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Place a chunk at `start` (in samples). Any part before the current
    /// position is already in the past and will not be heard.
    pub fn add(&mut self, id: ChunkId, start: u64, samples: Arc<[f32]>) {
        self.voices.insert(id, Voice { start, samples });
    }

    /// Drop a chunk; whatever has not been rendered yet stays silent.
    pub fn remove(&mut self, id: ChunkId) -> bool {
        self.voices.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Samples held for chunks that have not finished
    pub fn buffered_samples(&self) -> usize {
        self.voices.values().map(|v| v.samples.len()).sum()
    }

    /// Render the next `out.len()` samples and advance the timeline.
    ///
    /// Returns the ids of chunks that finished within the rendered range.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<ChunkId> {
        out.fill(0.0);
        let from = self.position;
        let to = from + out.len() as u64;

        for voice in self.voices.values() {
            let begin = voice.start.max(from);
            let end = voice.end().min(to);
            if begin >= end {
                continue;
            }
            let src = &voice.samples[(begin - voice.start) as usize..(end - voice.start) as usize];
            let dst = &mut out[(begin - from) as usize..(end - from) as usize];
            for (slot, sample) in dst.iter_mut().zip(src) {
                *slot = (*slot + sample).clamp(-1.0, 1.0);
            }
        }

        self.position = to;

        let finished: Vec<ChunkId> = self
            .voices
            .iter()
            .filter(|(_, v)| v.end() <= to)
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            self.voices.remove(id);
        }
        finished
    }
}

/// Linear resampler used where a device runs at a different rate.
pub fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (input.len() as f64 / ratio).floor() as usize;

    (0..out_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx = src.floor() as usize;
            let frac = (src - idx as f64) as f32;
            let s0 = input.get(idx).copied().unwrap_or(0.0);
            let s1 = input.get(idx + 1).copied().unwrap_or(s0);
            s0 + frac * (s1 - s0)
        })
        .collect()
}

/// Fills device buffers from a shared mixer.
///
/// The mixer runs at the source rate; the device may run at another rate
/// and with several channels. Finished chunk ids are reported on `finished`.
pub struct OutputRenderer {
    mixer: Arc<Mutex<PlaybackMixer>>,
    finished: mpsc::UnboundedSender<ChunkId>,
    source_rate: u32,
    device_rate: u32,
    channels: usize,
    /// Fractional source samples owed to the next buffer
    carry: f64,
}

impl OutputRenderer {
    pub fn new(
        mixer: Arc<Mutex<PlaybackMixer>>,
        finished: mpsc::UnboundedSender<ChunkId>,
        source_rate: u32,
        device_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            mixer,
            finished,
            source_rate,
            device_rate,
            channels: channels.max(1) as usize,
            carry: 0.0,
        }
    }

    /// Fill an interleaved device buffer
    pub fn fill(&mut self, out: &mut [f32]) {
        let frames = out.len() / self.channels;
        self.carry += frames as f64 * self.source_rate as f64 / self.device_rate.max(1) as f64;
        let needed = self.carry.floor() as usize;
        self.carry -= needed as f64;

        let mut block = vec![0.0f32; needed];
        let finished = match self.mixer.lock() {
            Ok(mut mixer) => mixer.render(&mut block),
            Err(_) => Vec::new(),
        };
        for id in finished {
            let _ = self.finished.send(id);
        }

        let mut mono = resample_linear(&block, self.source_rate, self.device_rate);
        mono.resize(frames, 0.0);
        for (frame, sample) in out.chunks_mut(self.channels).zip(mono) {
            frame.fill(sample);
        }
    }
}
