// Test doubles for the live session: a capture backend fed by the test, a
// playback output with a manually advanced clock, and a connector whose
// inbound events are injected by the test.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use audio_suite::audio::{AudioBackend, AudioFrame, AudioOutput, ChunkId, EncodedFrame, OutputDevice, PlaybackChunk};
use audio_suite::live::{ConnectionEvent, ConnectionEvents, Connector, LiveConnection};
use audio_suite::{LiveError, Result, SessionConfig, SessionController};
use base64::Engine;
use tokio::sync::mpsc;

/// Everything the fakes observe, shared with the test
#[derive(Default)]
pub struct RigState {
    // capture
    pub fail_capture: bool,
    pub capture_tx: Option<mpsc::Sender<AudioFrame>>,
    pub capturing: bool,
    pub capture_starts: usize,
    pub capture_stops: usize,

    // playback
    pub clock: f64,
    pub played: Vec<PlaybackChunk>,
    pub stopped: Vec<ChunkId>,
    pub fail_play: bool,
    pub outputs_opened: usize,
    pub outputs_closed: usize,
    pub finished_tx: Option<mpsc::UnboundedSender<ChunkId>>,

    // connection
    pub fail_connect: bool,
    pub hold_connect: bool,
    pub events_tx: Option<mpsc::Sender<ConnectionEvent>>,
    pub sent: Vec<EncodedFrame>,
    pub connections_opened: usize,
    pub connections_closed: usize,
}

#[derive(Clone, Default)]
pub struct Rig(Arc<Mutex<RigState>>);

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RigState> {
        self.0.lock().unwrap()
    }

    pub fn set_clock(&self, seconds: f64) {
        self.lock().clock = seconds;
    }

    pub fn controller(&self) -> SessionController {
        SessionController::new(
            SessionConfig::default(),
            Box::new(FakeBackend(self.clone())),
            Box::new(FakeOutputDevice(self.clone())),
            Box::new(FakeConnector(self.clone())),
        )
    }

    pub async fn push_frame(&self, samples: Vec<f32>) {
        let tx = self.lock().capture_tx.clone().expect("capture not started");
        tx.send(AudioFrame {
            samples,
            sample_rate: 16000,
            timestamp_ms: 0,
        })
        .await
        .unwrap();
    }

    pub async fn push_event(&self, event: ConnectionEvent) {
        let tx = self.lock().events_tx.clone().expect("not connected");
        tx.send(event).await.unwrap();
    }

    pub fn finish_chunk(&self, id: ChunkId) {
        let tx = self.lock().finished_tx.clone().expect("output not open");
        tx.send(id).unwrap();
    }
}

/// Base64 PCM payload of `seconds` of silence at 24kHz
pub fn silence_payload(seconds: f64) -> String {
    let samples = (seconds * 24000.0).round() as usize;
    base64::engine::general_purpose::STANDARD.encode(vec![0u8; samples * 2])
}

pub struct FakeBackend(pub Rig);

#[async_trait::async_trait]
impl AudioBackend for FakeBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let mut state = self.0.lock();
        if state.fail_capture {
            return Err(LiveError::acquisition("permission denied"));
        }
        let (tx, rx) = mpsc::channel(16);
        state.capture_tx = Some(tx);
        state.capturing = true;
        state.capture_starts += 1;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut state = self.0.lock();
        state.capture_tx = None;
        state.capturing = false;
        state.capture_stops += 1;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.0.lock().capturing
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub struct FakeOutputDevice(pub Rig);

impl OutputDevice for FakeOutputDevice {
    fn open(
        &mut self,
        _sample_rate: u32,
        finished: mpsc::UnboundedSender<ChunkId>,
    ) -> Result<Box<dyn AudioOutput>> {
        let mut state = self.0.lock();
        state.outputs_opened += 1;
        state.finished_tx = Some(finished);
        Ok(Box::new(ManualOutput(self.0.clone())))
    }
}

/// Output whose clock only moves when the test says so
pub struct ManualOutput(pub Rig);

impl AudioOutput for ManualOutput {
    fn current_time(&self) -> f64 {
        self.0.lock().clock
    }

    fn play(&mut self, chunk: &PlaybackChunk) -> Result<()> {
        let mut state = self.0.lock();
        if state.fail_play {
            return Err(LiveError::output("device gone"));
        }
        state.played.push(chunk.clone());
        Ok(())
    }

    fn stop(&mut self, id: ChunkId) {
        self.0.lock().stopped.push(id);
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.0.lock();
        state.outputs_closed += 1;
        state.finished_tx = None;
        Ok(())
    }
}

pub struct FakeConnector(pub Rig);

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _config: &SessionConfig,
    ) -> Result<(Box<dyn LiveConnection>, ConnectionEvents)> {
        let (fail, hold) = {
            let state = self.0.lock();
            (state.fail_connect, state.hold_connect)
        };
        if hold {
            std::future::pending::<()>().await;
        }
        if fail {
            return Err(LiveError::connection("handshake rejected"));
        }

        let (tx, rx) = mpsc::channel(64);
        let mut state = self.0.lock();
        state.events_tx = Some(tx);
        state.connections_opened += 1;
        Ok((Box::new(FakeConnection { rig: self.0.clone(), open: true }), rx))
    }
}

pub struct FakeConnection {
    rig: Rig,
    open: bool,
}

#[async_trait::async_trait]
impl LiveConnection for FakeConnection {
    fn send_audio(&self, frame: &EncodedFrame) -> Result<()> {
        if !self.open {
            return Err(LiveError::frame_delivery("closed"));
        }
        self.rig.lock().sent.push(frame.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            let mut state = self.rig.lock();
            state.connections_closed += 1;
            state.events_tx = None;
        }
        Ok(())
    }
}
