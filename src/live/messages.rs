use serde::{Deserialize, Serialize};

use crate::audio::EncodedFrame;

/// First message on the stream: model and capability configuration
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Serializes as `{}`
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

/// Outbound microphone audio
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64-encoded PCM bytes
    pub data: String,
}

impl RealtimeInputMessage {
    pub fn from_frame(frame: &EncodedFrame) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: frame.mime_type.to_string(),
                    data: frame.to_base64(),
                }],
            },
        }
    }
}

/// Any message received from the live endpoint
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<MediaChunk>,
}

/// Connection-level events delivered to the session, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The remote accepted the setup; audio may flow
    Opened,
    InputTranscription(String),
    OutputTranscription(String),
    /// Base64-encoded 24kHz PCM
    Audio(String),
    Interrupted,
    TurnComplete,
    Error(String),
    Closed,
}

impl ServerMessage {
    /// Split one server message into the events it carries.
    pub fn into_events(self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(ConnectionEvent::Opened);
        }

        if let Some(content) = self.server_content {
            if let Some(t) = content.input_transcription {
                events.push(ConnectionEvent::InputTranscription(t.text));
            }
            if let Some(t) = content.output_transcription {
                events.push(ConnectionEvent::OutputTranscription(t.text));
            }
            if let Some(turn) = content.model_turn {
                events.extend(
                    turn.parts
                        .into_iter()
                        .filter_map(|p| p.inline_data)
                        .map(|d| ConnectionEvent::Audio(d.data)),
                );
            }
            if content.interrupted {
                events.push(ConnectionEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(ConnectionEvent::TurnComplete);
            }
        }

        events
    }
}
