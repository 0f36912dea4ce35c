use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::{AudioSink, AudioSource};
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LiveConfig {
    /// WebSocket URL of the bidirectional endpoint
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Usually supplied as AUDIO_SUITE__LIVE__API_KEY
    #[serde(default)]
    pub api_key: String,
}

fn default_voice() -> String {
    "Zephyr".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub input: InputKind,
    #[serde(default)]
    pub output: OutputKind,
    /// WAV file streamed as the microphone when `input = "file"`
    #[serde(default)]
    pub input_path: String,
    /// WAV file receiving the playback timeline when `output = "wav"`
    #[serde(default)]
    pub output_path: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    File,
    Microphone,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Wav,
    Speaker,
}

impl AudioConfig {
    pub fn source(&self) -> Result<AudioSource> {
        match self.input {
            InputKind::Microphone => Ok(AudioSource::Microphone),
            InputKind::File if self.input_path.is_empty() => {
                anyhow::bail!("audio.input_path is required when audio.input = \"file\"")
            }
            InputKind::File => Ok(AudioSource::File(self.input_path.clone().into())),
        }
    }

    pub fn sink(&self) -> Result<AudioSink> {
        match self.output {
            OutputKind::Speaker => Ok(AudioSink::Speaker),
            OutputKind::Wav if self.output_path.is_empty() => {
                anyhow::bail!("audio.output_path is required when audio.output = \"wav\"")
            }
            OutputKind::Wav => Ok(AudioSink::Wav(self.output_path.clone().into())),
        }
    }
}

impl Config {
    /// Load `path` (any format the `config` crate understands, extension
    /// optional) layered with `AUDIO_SUITE__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("AUDIO_SUITE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: self.live.model.clone(),
            voice: self.live.voice.clone(),
            ..SessionConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(toml: &str) -> AudioConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_audio_defaults_to_files() {
        let cfg = audio("input_path = \"mic.wav\"\noutput_path = \"out.wav\"");
        assert_eq!(cfg.input, InputKind::File);
        assert!(matches!(cfg.source().unwrap(), AudioSource::File(p) if p.ends_with("mic.wav")));
        assert!(matches!(cfg.sink().unwrap(), AudioSink::Wav(p) if p.ends_with("out.wav")));
    }

    #[test]
    fn test_audio_host_devices() {
        let cfg = audio("input = \"microphone\"\noutput = \"speaker\"");
        assert!(matches!(cfg.source().unwrap(), AudioSource::Microphone));
        assert!(matches!(cfg.sink().unwrap(), AudioSink::Speaker));
    }

    #[test]
    fn test_file_input_needs_a_path() {
        let cfg = audio("output = \"speaker\"");
        assert!(cfg.source().is_err());
    }
}
