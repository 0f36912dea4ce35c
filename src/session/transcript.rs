use serde::{Deserialize, Serialize};

/// A finalized user/model exchange
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub user: String,
    pub model: String,
}

/// In-progress text for the current turn, one accumulator per direction.
///
/// Fragments are concatenated exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TranscriptAccumulator {
    #[serde(rename = "user")]
    current_input: String,
    #[serde(rename = "model")]
    current_output: String,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user_fragment(&mut self, fragment: &str) {
        self.current_input.push_str(fragment);
    }

    pub fn append_model_fragment(&mut self, fragment: &str) {
        self.current_output.push_str(fragment);
    }

    /// Take the pending text as a turn, leaving the accumulator empty.
    /// Returns `None` when neither direction has text.
    pub fn flush(&mut self) -> Option<TranscriptTurn> {
        if self.is_empty() {
            return None;
        }
        Some(TranscriptTurn {
            user: std::mem::take(&mut self.current_input),
            model: std::mem::take(&mut self.current_output),
        })
    }

    pub fn clear(&mut self) {
        self.current_input.clear();
        self.current_output.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.current_input.is_empty() && self.current_output.is_empty()
    }

    pub fn current_input(&self) -> &str {
        &self.current_input
    }

    pub fn current_output(&self) -> &str {
        &self.current_output
    }
}

/// Finalized turns of the current session plus the turn in progress
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    pub turns: Vec<TranscriptTurn>,
    pub pending: TranscriptAccumulator,
}

impl Transcript {
    /// Move pending text into the log. Returns whether a turn was appended.
    pub fn commit_pending(&mut self) -> bool {
        match self.pending.flush() {
            Some(turn) => {
                self.turns.push(turn);
                true
            }
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.pending.clear();
    }
}
