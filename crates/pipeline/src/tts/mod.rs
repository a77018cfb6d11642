//! Streaming text-to-speech provider sessions
//!
//! Two provider families sit behind one contract:
//! - ElevenLabs-like: persistent WebSocket, incremental text with flush
//!   marks, idle keep-alives, explicit interrupt on halt.
//! - Google-like: one HTTP request per utterance; connect is implicit
//!   and halt is necessarily a best-effort no-op.
//!
//! Output normalization lives here: providers return 16kHz linear PCM,
//! WAV-wrapped payloads, or raw μ-law, and the adapter converts to the
//! single format the active transport expects. The orchestrator never
//! learns which provider is wired in.

pub mod elevenlabs;
pub mod google;

pub use elevenlabs::{ElevenLabsConfig, ElevenLabsSession};
pub use google::{GoogleTtsConfig, GoogleTtsSession};

use async_trait::async_trait;
use voice_gateway_core::AudioFrame;

use crate::observer::SubscriptionId;
use crate::{ConnectionState, SessionError};

/// Synthesized-audio subscriber.
pub type AudioCallback = Box<dyn Fn(&AudioFrame) + Send + Sync>;

/// Output format a session normalizes provider audio to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsOutputFormat {
    /// 8kHz μ-law for the telephony transport.
    Mulaw8k,
    /// Provider-native bytes for browser-side decode.
    Native,
}

/// One session against a text-to-speech provider.
#[async_trait]
pub trait TextToSpeechSession: Send + Sync {
    /// Establish the provider connection and send the configuration
    /// handshake. No-op for request/response providers and when already
    /// connected.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Queue text for synthesis. `flush` marks a complete utterance
    /// boundary. Empty, whitespace-only, and punctuation-only text is
    /// rejected before any provider traffic.
    ///
    /// Unlike audio sends, failures here are surfaced: silently dropped
    /// LLM speech is worse than a logged retry decision upstream.
    async fn send_text(&self, text: &str, flush: bool) -> Result<(), SessionError>;

    /// Register an audio subscriber. Frames arrive already normalized
    /// to the configured output format, in synthesis order.
    fn on_audio(&self, callback: AudioCallback) -> SubscriptionId;

    /// Remove an audio subscriber.
    fn off_audio(&self, id: SubscriptionId);

    /// Interrupt in-flight synthesis (barge-in). Streaming providers
    /// send an interrupt control message; request/response providers
    /// cannot abort an in-flight HTTP exchange and treat this as a
    /// best-effort no-op.
    async fn halt(&self) -> Result<(), SessionError>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Disable reconnection and release the session. Safe to call
    /// multiple times.
    async fn close(&self);
}
