//! Transcript types for STT output

use serde::{Deserialize, Serialize};

/// Transcript event from an STT session
///
/// Providers emit a stream of partial transcripts followed by a final
/// one per utterance. Consumers accumulate partials and commit on final;
/// the accumulator is cleared once a final is consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Transcribed text
    pub text: String,

    /// Is this a final result?
    pub is_final: bool,

    /// Provider-reported confidence (0.0 - 1.0), 0.0 when not reported
    pub confidence: f32,
}

impl Transcript {
    /// Create a new transcript
    pub fn new(text: impl Into<String>, is_final: bool, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final,
            confidence,
        }
    }

    /// Create a partial (non-final) transcript
    pub fn partial(text: impl Into<String>) -> Self {
        Self::new(text, false, 0.0)
    }

    /// Create a final transcript
    pub fn final_result(text: impl Into<String>) -> Self {
        Self::new(text, true, 0.0)
    }

    /// Check if the transcript carries no usable text
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
