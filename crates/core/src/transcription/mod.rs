mod scripted;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use scripted::{ScriptedTranscription, UnavailableTranscription};

/// Per-utterance delivery quality as judged by the recognizer, each 0 to 100.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct UtteranceSignals {
    pub confidence: f64,
    pub clarity: f64,
    pub enthusiasm: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
    /// Offset from the start of the subscription.
    pub timestamp: Duration,
    pub signals: Option<UtteranceSignals>,
}

impl TranscriptEvent {
    pub fn final_text(text: impl Into<String>, timestamp: Duration) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            timestamp,
            signals: None,
        }
    }

    pub fn interim(text: impl Into<String>, timestamp: Duration) -> Self {
        Self {
            is_final: false,
            ..Self::final_text(text, timestamp)
        }
    }

    pub fn with_signals(mut self, signals: UtteranceSignals) -> Self {
        self.signals = Some(signals);
        self
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    #[error("speech recognition is not available")]
    Unavailable,
}

/// Streaming speech recognizer.
pub trait TranscriptionProvider: Send + Sync {
    /// Capability check. Callers must not subscribe when this is false.
    fn is_available(&self) -> bool;

    /// Starts a fresh event sequence. Each call restarts from the beginning and the
    /// stream does nothing until polled.
    fn subscribe(&self) -> Result<BoxStream<'static, TranscriptEvent>, TranscriptionError>;
}
