use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use super::config::SessionConfig;
use super::stats::{SessionSnapshot, SessionState};
use super::transcript::Transcript;
use crate::audio::{
    encode_frame, AudioBackend, AudioFrame, ChunkId, OutputDevice, OutputScheduler,
    OUTPUT_SAMPLE_RATE,
};
use crate::error::{LiveError, Result};
use crate::live::{ConnectionEvent, ConnectionEvents, Connector, LiveConnection};

/// Everything that can move the controller, in the order it happened
#[derive(Debug)]
pub enum SessionEvent {
    /// Something arrived on (or happened to) the remote stream
    Connection(ConnectionEvent),
    /// The capture pipeline produced a block
    CaptureFrame(AudioFrame),
    /// The capture pipeline stopped producing blocks
    CaptureEnded,
    /// A playback chunk played to its end
    PlaybackFinished(ChunkId),
}

/// Handles owned by one active session. Every field is released
/// independently during teardown, so a half-built session unwinds cleanly.
struct LiveSession {
    id: String,
    started_at: DateTime<Utc>,
    capture_started: bool,
    capture: Option<mpsc::Receiver<AudioFrame>>,
    scheduler: Option<OutputScheduler>,
    finished: Option<mpsc::UnboundedReceiver<ChunkId>>,
    connection: Option<Box<dyn LiveConnection>>,
    events: Option<ConnectionEvents>,
    /// Set once the remote has accepted the setup
    connection_ready: bool,
}

impl LiveSession {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            capture_started: false,
            capture: None,
            scheduler: None,
            finished: None,
            connection: None,
            events: None,
            connection_ready: false,
        }
    }
}

/// Live conversation state machine: `Idle → Starting → Open → Closing → Idle`.
///
/// Owns the capture backend, the output device and the connector, and at most
/// one [`LiveSession`] at a time. All methods take `&mut self`; the
/// [`runner`](super::runner) drives it from a single task.
pub struct SessionController {
    config: SessionConfig,
    capture: Box<dyn AudioBackend>,
    output: Box<dyn OutputDevice>,
    connector: Box<dyn Connector>,
    state: SessionState,
    session: Option<LiveSession>,
    transcript: Transcript,
    frames_sent: u64,
    frames_dropped: u64,
    last_error: Option<String>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        capture: Box<dyn AudioBackend>,
        output: Box<dyn OutputDevice>,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self {
            config,
            capture,
            output,
            connector,
            state: SessionState::Idle,
            session: None,
            transcript: Transcript::default(),
            frames_sent: 0,
            frames_dropped: 0,
            last_error: None,
        }
    }

    /// Acquire the microphone, open playback and connect.
    ///
    /// No-op unless idle. On success the controller is `Starting` and moves
    /// to `Open` when [`ConnectionEvent::Opened`] is handled. On failure
    /// everything acquired so far is released and the controller is idle again.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            debug!("Start ignored while {:?}", self.state);
            return Ok(());
        }

        let session = LiveSession::new();
        info!("Starting live session {}", session.id);

        self.state = SessionState::Starting;
        self.session = Some(session);
        self.transcript.reset();
        self.frames_sent = 0;
        self.frames_dropped = 0;
        self.last_error = None;

        if let Err(e) = self.acquire().await {
            error!("Failed to start live session: {}", e);
            self.last_error = Some(e.to_string());
            self.close().await;
            return Err(e);
        }

        Ok(())
    }

    /// Each handle is stored as soon as it exists so that a failure (or a
    /// cancelled start) can release it.
    async fn acquire(&mut self) -> Result<()> {
        let frames = self.capture.start().await.map_err(|e| match e {
            LiveError::Acquisition(_) => e,
            other => LiveError::acquisition(other.to_string()),
        })?;
        {
            let session = self.session_mut()?;
            session.capture_started = true;
            session.capture = Some(frames);
        }
        info!("Microphone acquired via {} backend", self.capture.name());

        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let output = self
            .output
            .open(OUTPUT_SAMPLE_RATE, finished_tx)
            .map_err(|e| LiveError::acquisition(format!("playback unavailable: {}", e)))?;
        {
            let session = self.session_mut()?;
            session.scheduler = Some(OutputScheduler::new(output, OUTPUT_SAMPLE_RATE));
            session.finished = Some(finished_rx);
        }

        let (connection, events) =
            self.connector
                .connect(&self.config)
                .await
                .map_err(|e| match e {
                    LiveError::Connection(_) => e,
                    other => LiveError::connection(other.to_string()),
                })?;
        let session = self.session_mut()?;
        session.connection = Some(connection);
        session.events = Some(events);
        info!("Live connection requested, waiting for the remote to accept setup");

        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut LiveSession> {
        self.session.as_mut().ok_or(LiveError::Aborted)
    }

    /// User-initiated end of the session. No-op when idle.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Idle && self.session.is_none() {
            debug!("Stop ignored, no active session");
            return;
        }
        info!("Stopping live session");
        self.close().await;
    }

    /// Apply one event to the state machine.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connection(event) => self.handle_connection_event(event).await,
            SessionEvent::CaptureFrame(frame) => self.forward_frame(&frame),
            SessionEvent::CaptureEnded => {
                if let Some(session) = self.session.as_mut() {
                    if session.capture.take().is_some() {
                        info!("Capture stream ended");
                    }
                }
            }
            SessionEvent::PlaybackFinished(id) => {
                if let Some(scheduler) = self.session.as_mut().and_then(|s| s.scheduler.as_mut()) {
                    scheduler.finished(id);
                }
            }
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match (self.state, event) {
            (state, ConnectionEvent::Error(message)) if state.is_active() => {
                let error = LiveError::connection(message);
                error!("Live session error: {}", error);
                self.last_error = Some(error.to_string());
                self.close().await;
            }
            (state, ConnectionEvent::Closed) if state.is_active() => {
                info!("Live connection closed by remote");
                self.close().await;
            }
            (SessionState::Starting, ConnectionEvent::Opened) => {
                if let Some(session) = self.session.as_mut() {
                    // Blocks still queued were captured before the stream was ready
                    let mut stale = 0;
                    if let Some(rx) = session.capture.as_mut() {
                        while let Ok(frame) = rx.try_recv() {
                            trace!("Dropping frame at {}ms captured before open", frame.timestamp_ms);
                            stale += 1;
                        }
                    }
                    session.connection_ready = true;
                    info!("Live session {} open, streaming microphone", session.id);
                    self.frames_dropped += stale;
                }
                self.state = SessionState::Open;
            }
            (SessionState::Open, ConnectionEvent::InputTranscription(text)) => {
                self.transcript.pending.append_user_fragment(&text);
            }
            (SessionState::Open, ConnectionEvent::OutputTranscription(text)) => {
                self.transcript.pending.append_model_fragment(&text);
            }
            (SessionState::Open, ConnectionEvent::TurnComplete) => {
                if self.transcript.commit_pending() {
                    debug!("Turn {} complete", self.transcript.turns.len());
                }
            }
            (SessionState::Open, ConnectionEvent::Audio(payload)) => {
                if let Some(scheduler) = self.session.as_mut().and_then(|s| s.scheduler.as_mut()) {
                    // Decode failures are logged by the scheduler and do not end the session
                    let _ = scheduler.enqueue(&payload);
                }
            }
            (SessionState::Open, ConnectionEvent::Interrupted) => {
                // Pending transcript stays as is; only playback is cut
                if let Some(scheduler) = self.session.as_mut().and_then(|s| s.scheduler.as_mut()) {
                    scheduler.interrupt_all();
                }
            }
            (state, event) => {
                debug!("Ignoring {:?} while {:?}", event, state);
            }
        }
    }

    /// Encode a captured block and hand it to the connection, or drop it.
    fn forward_frame(&mut self, frame: &AudioFrame) {
        let connection = match self.session.as_ref() {
            Some(LiveSession {
                connection: Some(connection),
                connection_ready: true,
                ..
            }) => connection,
            _ => {
                self.frames_dropped += 1;
                trace!("Dropping frame at {}ms, connection not ready", frame.timestamp_ms);
                return;
            }
        };

        match connection.send_audio(&encode_frame(&frame.samples)) {
            Ok(()) => self.frames_sent += 1,
            Err(e) => {
                self.frames_dropped += 1;
                debug!("Frame at {}ms not delivered: {}", frame.timestamp_ms, e);
            }
        }
    }

    /// Release every session resource, in order, then return to `Idle`.
    /// Safe to call in any state and more than once.
    async fn close(&mut self) {
        if self.state == SessionState::Idle && self.session.is_none() {
            return;
        }
        self.state = SessionState::Closing;

        if let Some(mut session) = self.session.take() {
            info!("Closing live session {}", session.id);
            session.connection_ready = false;

            if let Some(mut connection) = session.connection.take() {
                if let Err(e) = connection.close().await {
                    warn!("Failed to close live connection: {}", e);
                }
                debug!("Live connection released");
            }
            session.events = None;

            if session.capture.take().is_some() {
                debug!("Capture pipeline disconnected");
            }

            if session.capture_started || self.capture.is_capturing() {
                if let Err(e) = self.capture.stop().await {
                    warn!("Failed to stop {} capture: {}", self.capture.name(), e);
                }
                debug!("Microphone released");
            }

            if let Some(mut scheduler) = session.scheduler.take() {
                scheduler.reset();
                if let Err(e) = scheduler.close() {
                    warn!("Failed to close playback: {}", e);
                }
            }
            session.finished = None;
        }

        if self.transcript.commit_pending() {
            debug!("Flushed pending transcript into the log");
        }
        self.transcript.pending.clear();

        self.state = SessionState::Idle;
        info!(
            "Live session closed ({} frames sent, {} dropped, {} turns)",
            self.frames_sent,
            self.frames_dropped,
            self.transcript.turns.len()
        );
    }

    /// Wait for the next event from the active session's sources.
    /// Never resolves while idle. Cancel-safe.
    pub async fn next_event(&mut self) -> SessionEvent {
        let Some(session) = self.session.as_mut() else {
            return std::future::pending().await;
        };

        tokio::select! {
            event = recv_or_pending(&mut session.events) => match event {
                Some(event) => SessionEvent::Connection(event),
                None => {
                    session.events = None;
                    SessionEvent::Connection(ConnectionEvent::Closed)
                }
            },
            frame = recv_or_pending(&mut session.capture) => match frame {
                Some(frame) => SessionEvent::CaptureFrame(frame),
                None => {
                    session.capture = None;
                    SessionEvent::CaptureEnded
                }
            },
            Some(id) = recv_unbounded_or_pending(&mut session.finished) => {
                SessionEvent::PlaybackFinished(id)
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_connection_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.connection_ready)
    }

    pub fn active_chunks(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|s| s.scheduler.as_ref())
            .map_or(0, OutputScheduler::active_count)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            session_id: self.session.as_ref().map(|s| s.id.clone()),
            started_at: self.session.as_ref().map(|s| s.started_at),
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
            active_chunks: self.active_chunks(),
            turns: self.transcript.turns.len(),
            last_error: self.last_error.clone(),
        }
    }
}

async fn recv_or_pending<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_unbounded_or_pending<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
