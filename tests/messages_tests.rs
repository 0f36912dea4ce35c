// Wire format tests for the live stream messages

use audio_suite::audio::encode_frame;
use audio_suite::live::{ConnectionEvent, RealtimeInputMessage, ServerMessage, SetupMessage};
use audio_suite::SessionConfig;
use serde_json::json;

fn events(raw: &str) -> Vec<ConnectionEvent> {
    serde_json::from_str::<ServerMessage>(raw).unwrap().into_events()
}

#[test]
fn test_setup_message_shape() {
    let config = SessionConfig {
        model: "gemini-live".to_string(),
        voice: "Zephyr".to_string(),
        ..SessionConfig::default()
    };

    let value = serde_json::to_value(SetupMessage::from_config(&config)).unwrap();

    assert_eq!(
        value,
        json!({
            "setup": {
                "model": "models/gemini-live",
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Zephyr" } }
                    }
                },
                "inputAudioTranscription": {},
                "outputAudioTranscription": {}
            }
        })
    );
}

#[test]
fn test_setup_without_transcription() {
    let config = SessionConfig {
        transcribe_input: false,
        transcribe_output: false,
        ..SessionConfig::default()
    };

    let value = serde_json::to_value(SetupMessage::from_config(&config)).unwrap();
    assert!(value["setup"].get("inputAudioTranscription").is_none());
    assert!(value["setup"].get("outputAudioTranscription").is_none());
}

#[test]
fn test_realtime_input_message() {
    let frame = encode_frame(&[1.0, -1.0]);
    let value = serde_json::to_value(RealtimeInputMessage::from_frame(&frame)).unwrap();

    assert_eq!(
        value,
        json!({
            "realtimeInput": {
                "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": "/38AgA==" }]
            }
        })
    );
}

#[test]
fn test_setup_complete_opens() {
    assert_eq!(events(r#"{"setupComplete": {}}"#), vec![ConnectionEvent::Opened]);
}

#[test]
fn test_transcription_fragments() {
    let raw = r#"{
        "serverContent": {
            "inputTranscription": { "text": "Hallo" },
            "outputTranscription": { "text": "Hi dort" }
        }
    }"#;

    assert_eq!(
        events(raw),
        vec![
            ConnectionEvent::InputTranscription("Hallo".to_string()),
            ConnectionEvent::OutputTranscription("Hi dort".to_string()),
        ]
    );
}

#[test]
fn test_audio_parts() {
    let raw = r#"{
        "serverContent": {
            "modelTurn": {
                "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                    { "text": "ignored" },
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQAB" } }
                ]
            }
        }
    }"#;

    assert_eq!(
        events(raw),
        vec![
            ConnectionEvent::Audio("AAAA".to_string()),
            ConnectionEvent::Audio("AQAB".to_string()),
        ]
    );
}

#[test]
fn test_turn_complete_comes_after_content() {
    let raw = r#"{
        "serverContent": {
            "turnComplete": true,
            "outputTranscription": { "text": "Ende" },
            "modelTurn": { "parts": [ { "inlineData": { "mimeType": "audio/pcm", "data": "AAAA" } } ] }
        }
    }"#;

    assert_eq!(
        events(raw),
        vec![
            ConnectionEvent::OutputTranscription("Ende".to_string()),
            ConnectionEvent::Audio("AAAA".to_string()),
            ConnectionEvent::TurnComplete,
        ]
    );
}

#[test]
fn test_interrupted() {
    assert_eq!(
        events(r#"{"serverContent": {"interrupted": true}}"#),
        vec![ConnectionEvent::Interrupted]
    );
}

#[test]
fn test_unknown_messages_carry_no_events() {
    assert!(events(r#"{"usageMetadata": {"totalTokenCount": 12}}"#).is_empty());
    assert!(events(r#"{"goAway": {"timeLeft": "10s"}}"#).is_empty());
    assert!(events(r#"{"serverContent": {"turnComplete": false}}"#).is_empty());
}
