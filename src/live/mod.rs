//! Boundary with the remote conversational endpoint
//!
//! - `messages`: wire format of the bidirectional stream
//! - `client`: `Connector`/`LiveConnection` traits and the WebSocket client

pub mod client;
pub mod messages;

pub use client::{ConnectionEvents, Connector, GeminiLiveClient, GeminiLiveConnection, LiveConnection};
pub use messages::{ConnectionEvent, RealtimeInputMessage, ServerMessage, SetupMessage};
