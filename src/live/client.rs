use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::messages::{
    ConnectionEvent, Empty, GenerationConfig, PrebuiltVoiceConfig, RealtimeInputMessage,
    ServerMessage, Setup, SetupMessage, SpeechConfig, VoiceConfig,
};
use crate::audio::EncodedFrame;
use crate::error::{LiveError, Result};
use crate::session::SessionConfig;

/// Inbound events from an open connection
pub type ConnectionEvents = mpsc::Receiver<ConnectionEvent>;

/// Opens bidirectional streams to the live endpoint
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Open a stream configured for `config`.
    ///
    /// The stream is not ready for audio until [`ConnectionEvent::Opened`]
    /// arrives on the returned receiver.
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn LiveConnection>, ConnectionEvents)>;
}

/// Outbound half of an open stream
#[async_trait::async_trait]
pub trait LiveConnection: Send {
    /// Hand a frame to the stream without waiting for it to be written.
    fn send_audio(&self, frame: &EncodedFrame) -> Result<()>;

    /// Close the stream. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

impl SetupMessage {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            setup: Setup {
                model: qualified_model(&config.model),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: config.voice.clone(),
                            },
                        },
                    },
                },
                input_audio_transcription: config.transcribe_input.then(Empty::default),
                output_audio_transcription: config.transcribe_output.then(Empty::default),
            },
        }
    }
}

fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

/// WebSocket client for the Gemini Live bidirectional endpoint
pub struct GeminiLiveClient {
    endpoint: String,
    api_key: String,
}

impl GeminiLiveClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> String {
        if self.api_key.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?key={}", self.endpoint, self.api_key)
        }
    }
}

#[async_trait::async_trait]
impl Connector for GeminiLiveClient {
    async fn connect(
        &self,
        config: &SessionConfig,
    ) -> Result<(Box<dyn LiveConnection>, ConnectionEvents)> {
        info!("Connecting to live endpoint {}", self.endpoint);

        let request = self
            .url()
            .into_client_request()
            .map_err(|e| LiveError::connection(format!("invalid endpoint: {}", e)))?;
        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| LiveError::connection(format!("WebSocket connect error: {}", e)))?;
        let (mut sink, mut source) = stream.split();

        let setup = serde_json::to_string(&SetupMessage::from_config(config))?;
        sink.send(Message::Text(setup))
            .await
            .map_err(|e| LiveError::connection(format!("failed to send setup: {}", e)))?;
        info!(model = %config.model, voice = %config.voice, "Setup sent");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = sink.send(msg).await {
                    warn!("Live stream write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
            debug!("Live stream writer finished");
        });

        let (event_tx, event_rx) = mpsc::channel(256);
        let reader = tokio::spawn(async move {
            while let Some(incoming) = source.next().await {
                let text = match incoming {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Skipping non UTF-8 binary message: {}", e);
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        info!("Live stream closed by remote: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(ConnectionEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                let message = match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Skipping malformed server message: {}", e);
                        continue;
                    }
                };
                if let Some(go_away) = &message.go_away {
                    warn!("Live endpoint is going away: {}", go_away);
                }
                for event in message.into_events() {
                    if event_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            let _ = event_tx.send(ConnectionEvent::Closed).await;
        });

        Ok((
            Box::new(GeminiLiveConnection {
                outbound: Some(outbound_tx),
                writer: Some(writer),
                reader: Some(reader),
            }),
            event_rx,
        ))
    }
}

/// Open WebSocket stream; writes go through a dedicated writer task
pub struct GeminiLiveConnection {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl LiveConnection for GeminiLiveConnection {
    fn send_audio(&self, frame: &EncodedFrame) -> Result<()> {
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| LiveError::frame_delivery("connection closed"))?;
        let payload = serde_json::to_string(&RealtimeInputMessage::from_frame(frame))?;
        outbound
            .send(Message::Text(payload))
            .map_err(|_| LiveError::frame_delivery("writer task has stopped"))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Message::Close(None));
        }
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
                warn!("Live stream writer did not finish in time");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        Ok(())
    }
}

impl Drop for GeminiLiveConnection {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
