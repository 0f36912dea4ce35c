//! Live conversation session
//!
//! This module provides the `SessionController` state machine that manages:
//! - Microphone capture and PCM framing
//! - The bidirectional stream to the live endpoint
//! - Gapless playback of model audio, with barge-in interruption
//! - Transcript accumulation into finalized turns
//!
//! `SessionHandle` runs the controller on a single task.

mod config;
mod runner;
mod session;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use runner::SessionHandle;
pub use session::{SessionController, SessionEvent};
pub use stats::{SessionSnapshot, SessionState};
pub use transcript::{Transcript, TranscriptAccumulator, TranscriptTurn};
