use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the live session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Open,
    Closing,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// Id of the active session, if any
    pub session_id: Option<String>,

    pub started_at: Option<DateTime<Utc>>,

    /// Frames handed to the connection
    pub frames_sent: u64,

    /// Frames captured while the connection was not ready
    pub frames_dropped: u64,

    /// Playback chunks scheduled and not yet finished
    pub active_chunks: usize,

    /// Finalized turns so far
    pub turns: usize,

    /// Why the last session ended abnormally
    pub last_error: Option<String>,
}
