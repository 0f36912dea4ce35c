pub mod backend;
#[cfg(feature = "desktop-audio")]
pub mod device;
pub mod file;
pub mod mixer;
pub mod output;
pub mod pcm;
pub mod scheduler;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSink, AudioSource,
    FrameAssembler,
};
#[cfg(feature = "desktop-audio")]
pub use device::{CpalBackend, CpalOutputDevice};
pub use file::{AudioFile, FileBackend};
pub use mixer::{resample_linear, PlaybackMixer};
pub use output::{AudioOutput, ChunkId, OutputDevice, PlaybackChunk, WavOutput, WavOutputDevice};
pub use pcm::{
    decode_base64_pcm16, decode_pcm16, encode_frame, EncodedFrame, CAPTURE_BLOCK_SIZE,
    INPUT_MIME_TYPE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE,
};
pub use scheduler::{OutputScheduler, ScheduledChunk};
