//! Streaming speech-to-text provider sessions
//!
//! Two provider families sit behind one contract:
//! - Deepgram-like: persistent WebSocket, fixed-delay reconnects,
//!   retried indefinitely while the session is wanted.
//! - AssemblyAI-like: persistent WebSocket over an ephemeral token,
//!   exponential backoff with a bounded attempt budget that surfaces a
//!   terminal failure when exhausted.
//!
//! Audio is a lossy real-time stream: a chunk that fails to send gets
//! one implicit reconnect-and-retry and is then dropped, never buffered.

pub mod assemblyai;
pub mod deepgram;

pub use assemblyai::{AssemblyAiConfig, AssemblyAiSession};
pub use deepgram::{DeepgramConfig, DeepgramSession};

use async_trait::async_trait;
use voice_gateway_core::{AudioFrame, Transcript};

use crate::observer::SubscriptionId;
use crate::{ConnectionState, SessionError};

/// Transcript subscriber.
pub type TranscriptionCallback = Box<dyn Fn(&Transcript) + Send + Sync>;

/// One live connection to a speech-to-text provider.
#[async_trait]
pub trait SpeechToTextSession: Send + Sync {
    /// Establish the provider connection. Idempotent: calling while
    /// already connected is a no-op.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Forward one audio frame to the provider.
    ///
    /// Fails with `NotConnected` when no live session exists. With
    /// auto-reconnect enabled the adapter attempts one reconnect before
    /// giving up on this chunk; the chunk is never retried after that.
    async fn send_audio(&self, frame: AudioFrame) -> Result<(), SessionError>;

    /// Register a transcript subscriber. Subscribers fire in
    /// registration order for every partial and final event.
    fn on_transcription(&self, callback: TranscriptionCallback) -> SubscriptionId;

    /// Remove a transcript subscriber.
    fn off_transcription(&self, id: SubscriptionId);

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Disable auto-reconnect, then tear down the connection. Safe to
    /// call multiple times.
    async fn close(&self);
}
