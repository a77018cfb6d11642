//! LLM boundary for the voice gateway
//!
//! The gateway treats text generation as an opaque, ordered stream of
//! `StreamEvent`s. This crate provides the backend trait, the stream
//! plumbing with abort support, and a scripted backend used by tests
//! and the bundled offline loop.

pub mod scripted;
pub mod streaming;

pub use scripted::ScriptedBackend;
pub use streaming::{AbortHandle, GenerationSink, GenerationStream};

use async_trait::async_trait;
use thiserror::Error;
use voice_gateway_core::Turn;

/// LLM boundary errors
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("generation aborted")]
    Aborted,

    #[error("event channel closed")]
    ChannelClosed,
}

/// An opaque source of ordered generation events.
///
/// Starting a generation returns a stream; the caller owns exactly one
/// in-flight generation per session and aborts the previous one before
/// starting the next (last-writer-wins, no queueing).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Start a generation for the given user message and history.
    async fn generate(&self, user_text: &str, history: &[Turn])
        -> Result<GenerationStream, LlmError>;
}
