// Tests for WAV-backed capture and playback

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use audio_suite::audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioOutput,
    AudioSink, AudioSource, FileBackend, FrameAssembler, OutputDevice, PlaybackChunk, WavOutput,
    WavOutputDevice,
};
use audio_suite::LiveError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for s in samples {
        writer.write_sample(*s)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_open_mono_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("mono.wav");
    write_wav(&path, 16000, 1, &vec![16384; 16000])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 1.0).abs() < 1e-9);
    assert_eq!(audio.samples[0], 0.5);
    Ok(())
}

#[test]
fn test_open_stereo_file_downmixes() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_wav(&path, 16000, 2, &[16384, 0, -16384, -16384])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples, vec![0.25, -0.5]);
    Ok(())
}

#[test]
fn test_shipped_microphone_fixture_matches_capture_format() -> Result<()> {
    let cfg = audio_suite::Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/audio-suite"))?;
    let AudioSource::File(path) = cfg.audio.source()? else {
        panic!("default config should stream a file");
    };

    let audio = AudioFile::open(Path::new(env!("CARGO_MANIFEST_DIR")).join(path))?;
    assert_eq!(audio.sample_rate, AudioBackendConfig::default().sample_rate);
    assert_eq!(audio.channels, 1);
    assert!(audio.duration_seconds >= 1.0);
    Ok(())
}

#[test]
fn test_missing_file_is_acquisition_error() {
    let err = AudioFile::open("does/not/exist.wav").err().unwrap();
    assert!(matches!(err, LiveError::Acquisition(_)));
}

#[cfg(not(feature = "desktop-audio"))]
#[test]
fn test_factory_without_microphone_backend() {
    let err = AudioBackendFactory::create(AudioSource::Microphone, AudioBackendConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, LiveError::Acquisition(_)));

    let err = AudioBackendFactory::create_output(AudioSink::Speaker).err().unwrap();
    assert!(matches!(err, LiveError::Acquisition(_)));
}

#[cfg(feature = "desktop-audio")]
#[test]
fn test_factory_picks_host_devices() -> Result<()> {
    // Creating the backends does not touch the hardware yet
    let backend = AudioBackendFactory::create(AudioSource::Microphone, AudioBackendConfig::default())?;
    assert_eq!(backend.name(), "cpal");
    assert!(!backend.is_capturing());

    AudioBackendFactory::create_output(AudioSink::Speaker)?;
    Ok(())
}

#[test]
fn test_factory_file_source_and_wav_sink() -> Result<()> {
    let dir = TempDir::new()?;
    let backend =
        AudioBackendFactory::create(AudioSource::File(dir.path().join("in.wav")), AudioBackendConfig::default())?;
    assert_eq!(backend.name(), "file");

    let mut device = AudioBackendFactory::create_output(AudioSink::Wav(dir.path().join("out.wav")))?;
    let (tx, _rx) = mpsc::unbounded_channel();
    device.open(24000, tx)?.close()?;
    assert!(dir.path().join("out.wav").exists());
    Ok(())
}

#[test]
fn test_assembler_builds_mono_blocks_at_capture_rate() {
    let (tx, mut rx) = mpsc::channel(8);
    let config = AudioBackendConfig {
        block_size: 160,
        ..AudioBackendConfig::default()
    };
    let mut assembler = FrameAssembler::new(tx, &config, 32000, 2);

    // 5ms of 32kHz stereo per callback, 25ms in total
    for _ in 0..5 {
        assembler.push(&[0.5f32; 320]);
    }

    let frames: Vec<AudioFrame> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.samples.len() == 160 && f.sample_rate == 16000));
    assert!(frames[0].samples.iter().all(|s| *s == 0.5));
    assert_eq!(frames[0].timestamp_ms, 0);
    assert_eq!(frames[1].timestamp_ms, 10);
    assert_eq!(assembler.dropped(), 0);
}

#[test]
fn test_assembler_drops_blocks_when_consumer_is_behind() {
    let (tx, mut rx) = mpsc::channel(1);
    let config = AudioBackendConfig {
        block_size: 160,
        ..AudioBackendConfig::default()
    };
    let mut assembler = FrameAssembler::new(tx, &config, 16000, 1);

    assembler.push(&[0.1f32; 160 * 3]);

    assert_eq!(assembler.dropped(), 2);
    assert_eq!(rx.try_recv().map(|f| f.timestamp_ms).ok(), Some(0));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_file_backend_never_waits_on_a_slow_session() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("mic.wav");
    write_wav(&path, 16000, 1, &vec![1000; 160 * 5])?;

    let config = AudioBackendConfig {
        block_size: 160,
        channel_capacity: 1,
        ..AudioBackendConfig::default()
    };
    let mut backend = FileBackend::new(&path, config);
    let mut rx = backend.start().await?;

    // Five 10ms blocks are produced while nobody reads
    tokio::time::sleep(Duration::from_millis(300)).await;

    let first = rx.recv().await.expect("oldest block kept");
    assert_eq!(first.timestamp_ms, 0);
    // The rest were dropped and the stream has ended
    assert!(tokio::time::timeout(Duration::from_secs(1), rx.recv()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_file_backend_streams_fixed_blocks() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("mic.wav");
    // 2.5 blocks of audio
    write_wav(&path, 16000, 1, &vec![1000; 4096 * 2 + 2048])?;

    let mut backend = FileBackend::new(&path, AudioBackendConfig::default());
    let mut rx = backend.start().await?;
    assert!(backend.is_capturing());

    let mut frames = Vec::new();
    while let Some(frame) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await? {
        frames.push(frame);
    }

    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.samples.len() == 4096 && f.sample_rate == 16000));
    assert_eq!(frames[1].timestamp_ms, 256);
    // Last block is padded with silence
    assert_eq!(frames[2].samples[2048], 0.0);

    backend.stop().await?;
    assert!(!backend.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_file_backend_rejects_wrong_rate() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cd.wav");
    write_wav(&path, 44100, 1, &[0; 100])?;

    let mut backend = FileBackend::new(&path, AudioBackendConfig::default());
    let err = backend.start().await.err().unwrap();
    assert!(matches!(err, LiveError::Acquisition(_)));
    assert!(!backend.is_capturing());

    // Stopping a backend that never started is fine
    backend.stop().await?;
    Ok(())
}

fn chunk(id: u64, samples: usize, start_time: f64) -> PlaybackChunk {
    PlaybackChunk {
        id,
        samples: Arc::from(vec![0.5f32; samples]),
        sample_rate: 24000,
        start_time,
    }
}

#[tokio::test]
async fn test_wav_output_renders_timeline() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("playback.wav");
    let (tx, _rx) = mpsc::unbounded_channel();

    let mut output = WavOutputDevice::new(&path).open(24000, tx)?;
    output.play(&chunk(0, 2400, 0.0))?;
    output.play(&chunk(1, 2400, 0.1))?;
    // Let the clock pass the end of both chunks
    tokio::time::sleep(Duration::from_millis(300)).await;
    output.close()?;

    let reader = WavReader::open(&path)?;
    assert_eq!(reader.spec().sample_rate, 24000);
    assert_eq!(reader.spec().channels, 1);
    let samples: Vec<i16> = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<_, _>>()?;
    assert!(samples.len() >= 4800);
    assert!(samples[..4800].iter().all(|s| *s == 16383));
    assert!(samples[4800..].iter().all(|s| *s == 0));

    // Closed outputs refuse more audio
    assert!(matches!(output.play(&chunk(2, 10, 0.5)), Err(LiveError::Output(_))));
    Ok(())
}

#[tokio::test]
async fn test_wav_output_holds_only_unplayed_audio() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("late.wav");
    let (tx, _rx) = mpsc::unbounded_channel();

    // A chunk an hour ahead of the clock costs its own samples, not the gap
    let mut output = WavOutput::create(&path, 24000, tx)?;
    output.play(&chunk(0, 240, 3600.0))?;
    assert_eq!(output.buffered_samples(), 240);

    output.stop(0);
    assert_eq!(output.buffered_samples(), 0);
    output.close()?;

    // Only the wall-clock time that actually passed is written
    let reader = WavReader::open(&path)?;
    assert!(reader.len() < 24000);
    Ok(())
}

#[tokio::test]
async fn test_wav_output_streams_played_audio_before_close() -> Result<()> {
    let dir = TempDir::new()?;
    let (tx, _rx) = mpsc::unbounded_channel();

    let mut output = WavOutput::create(dir.path().join("stream.wav"), 24000, tx)?;
    output.play(&chunk(0, 240, 0.0))?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The next play flushes the played chunk out of memory
    output.play(&chunk(1, 240, output.current_time()))?;
    assert_eq!(output.buffered_samples(), 240);
    output.close()?;
    Ok(())
}

#[tokio::test]
async fn test_wav_output_reports_finished_chunks() -> Result<()> {
    let dir = TempDir::new()?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut output = WavOutputDevice::new(dir.path().join("out.wav")).open(24000, tx)?;
    let start = output.current_time();
    output.play(&chunk(7, 240, start))?; // 10ms

    let finished = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await?;
    assert_eq!(finished, Some(7));
    output.close()?;
    Ok(())
}

#[tokio::test]
async fn test_wav_output_stop_silences_rest_of_chunk() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("cut.wav");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut output = WavOutputDevice::new(&path).open(24000, tx)?;
    // Scheduled well in the future, so stopping it now silences all of it
    output.play(&chunk(3, 2400, 5.0))?;
    output.stop(3);
    output.stop(3);
    output.close()?;

    assert!(rx.try_recv().is_err());
    let samples: Vec<i16> = WavReader::open(&path)?
        .into_samples::<i16>()
        .collect::<std::result::Result<_, _>>()?;
    assert!(samples.iter().all(|s| *s == 0));
    Ok(())
}
