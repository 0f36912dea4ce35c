//! Gapless, in-order playback of inbound audio.
//!
//! Chunks are placed back to back on the output's clock: each one starts at
//! `max(next_start_time, now)`, so consecutive chunks never overlap and never
//! start in the past. Interruption (barge-in) stops everything that is still
//! scheduled and restarts the timeline at the current instant.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::output::{AudioOutput, ChunkId, PlaybackChunk};
use super::pcm::decode_base64_pcm16;
use crate::error::Result;

/// Start/end times of a chunk that has been handed to the output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: ChunkId,
    pub start_time: f64,
    pub duration: f64,
}

impl ScheduledChunk {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

pub struct OutputScheduler {
    output: Box<dyn AudioOutput>,
    sample_rate: u32,
    next_start_time: f64,
    active: BTreeMap<ChunkId, ScheduledChunk>,
    next_id: ChunkId,
}

impl OutputScheduler {
    pub fn new(output: Box<dyn AudioOutput>, sample_rate: u32) -> Self {
        Self {
            output,
            sample_rate,
            next_start_time: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Decode a base64 payload and schedule it after everything already queued.
    ///
    /// A payload that fails to decode (or that the output refuses) is dropped
    /// without touching the schedule.
    pub fn enqueue(&mut self, payload: &str) -> Result<ScheduledChunk> {
        let samples = decode_base64_pcm16(payload).inspect_err(|e| {
            warn!("Dropping inbound audio chunk: {}", e);
        })?;
        self.schedule(samples)
    }

    /// Schedule already-decoded samples
    pub fn schedule(&mut self, samples: Vec<f32>) -> Result<ScheduledChunk> {
        let start_time = self.next_start_time.max(self.output.current_time());

        let chunk = PlaybackChunk {
            id: self.next_id,
            samples: Arc::from(samples),
            sample_rate: self.sample_rate,
            start_time,
        };

        self.output.play(&chunk).inspect_err(|e| {
            warn!("Output refused chunk {}: {}", chunk.id, e);
        })?;

        let scheduled = ScheduledChunk {
            id: chunk.id,
            start_time,
            duration: chunk.duration(),
        };
        self.next_id += 1;
        self.next_start_time = scheduled.end_time();
        self.active.insert(scheduled.id, scheduled);

        debug!(
            "Scheduled chunk {} at {:.3}s for {:.3}s ({} active)",
            scheduled.id,
            scheduled.start_time,
            scheduled.duration,
            self.active.len()
        );
        Ok(scheduled)
    }

    /// A chunk played to its end
    pub fn finished(&mut self, id: ChunkId) {
        if self.active.remove(&id).is_some() {
            debug!("Chunk {} finished ({} active)", id, self.active.len());
        }
    }

    /// Stop every active chunk and restart the timeline at the current instant.
    pub fn interrupt_all(&mut self) {
        let stopped = self.active.len();
        for id in self.active.keys() {
            self.output.stop(*id);
        }
        self.active.clear();
        self.next_start_time = self.output.current_time();

        if stopped > 0 {
            info!("Playback interrupted, stopped {} chunks", stopped);
        }
    }

    /// Same as [`interrupt_all`](Self::interrupt_all), used at teardown
    pub fn reset(&mut self) {
        self.interrupt_all();
    }

    /// Release the playback context
    pub fn close(&mut self) -> Result<()> {
        self.output.close()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active chunks ordered by start time
    pub fn active_chunks(&self) -> Vec<ScheduledChunk> {
        // Ids are assigned in schedule order, which is also start-time order
        self.active.values().copied().collect()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }
}
