pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioOutput,
    AudioSink, AudioSource, EncodedFrame, FileBackend, OutputDevice, OutputScheduler, PlaybackChunk,
    WavOutputDevice,
};
pub use config::Config;
pub use error::{LiveError, Result};
pub use http::{create_router, AppState};
pub use live::{ConnectionEvent, Connector, GeminiLiveClient, LiveConnection};
pub use session::{
    SessionConfig, SessionController, SessionEvent, SessionHandle, SessionSnapshot, SessionState,
    Transcript, TranscriptAccumulator, TranscriptTurn,
};
