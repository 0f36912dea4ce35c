//! Error types for the live conversation core.

use thiserror::Error;

/// Result type for live session operations.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Errors raised by the live session, its audio plumbing and the remote stream.
#[derive(Error, Debug)]
pub enum LiveError {
    /// Microphone (or other capture source) could not be acquired.
    #[error("Audio capture unavailable: {0}")]
    Acquisition(String),

    /// The remote stream rejected, dropped or failed the connection.
    #[error("Live connection error: {0}")]
    Connection(String),

    /// An inbound audio payload could not be turned into playable samples.
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// An outbound frame could not be handed to the connection.
    #[error("Frame not delivered: {0}")]
    FrameDelivery(String),

    /// The playback device failed.
    #[error("Audio output error: {0}")]
    Output(String),

    /// A start was cancelled before the session opened.
    #[error("Session start aborted")]
    Aborted,

    /// The session event loop is no longer running.
    #[error("Session runner has stopped")]
    RunnerStopped,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LiveError {
    pub fn acquisition<S: Into<String>>(msg: S) -> Self {
        Self::Acquisition(msg.into())
    }

    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn frame_delivery<S: Into<String>>(msg: S) -> Self {
        Self::FrameDelivery(msg.into())
    }

    pub fn output<S: Into<String>>(msg: S) -> Self {
        Self::Output(msg.into())
    }
}
