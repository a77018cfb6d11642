//! Streaming voice pipeline
//!
//! This crate provides the provider-facing half of the gateway:
//! - Text segmentation for low-latency TTS hand-off
//! - Speech-to-text provider sessions (Deepgram, AssemblyAI families)
//! - Text-to-speech provider sessions (ElevenLabs streaming, Google
//!   request/response families)
//! - The per-conversation orchestrator wiring them together

pub mod observer;
pub mod orchestrator;
pub mod reconnect;
pub mod segment;
pub mod stt;
pub mod testing;
pub mod tts;
mod ws;

pub use observer::{CallbackRegistry, SubscriptionId};
pub use orchestrator::{
    OrchestratorConfig, OutboundAudioSink, SessionState, VoiceSessionOrchestrator,
};
pub use reconnect::{ReconnectPolicy, ReconnectSchedule};
pub use segment::{is_speakable, FlushDecision, SegmenterConfig, TextSegmenter};
pub use stt::{SpeechToTextSession, TranscriptionCallback};
pub use tts::{AudioCallback, TextToSpeechSession, TtsOutputFormat};

use thiserror::Error;

/// Provider session errors
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("no live session")]
    NotConnected,

    #[error("connect timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("malformed provider payload: {0}")]
    Decode(String),

    #[error("audio conversion failed: {0}")]
    Codec(String),

    #[error("provider rejected credentials: {0}")]
    Auth(String),

    #[error("reconnect attempts exhausted after {0} tries")]
    RetriesExhausted(u32),

    #[error("session closed")]
    Closed,
}

/// Provider connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Bounded retries exhausted; terminal until an explicit reconnect
    Failed,
}
