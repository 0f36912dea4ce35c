use serde::{Deserialize, Serialize};

/// Capability configuration sent when a live session opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model serving the live endpoint
    pub model: String,

    /// Prebuilt synthesized voice for model speech
    pub voice: String,

    /// Ask the remote to transcribe the user's speech
    pub transcribe_input: bool,

    /// Ask the remote to transcribe the model's speech
    pub transcribe_output: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Zephyr".to_string(),
            transcribe_input: true,
            transcribe_output: true,
        }
    }
}
