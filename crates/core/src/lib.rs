//! Core types for the voice gateway
//!
//! This crate provides foundational types used across all other crates:
//! - Audio frame types
//! - Transcript types
//! - LLM stream event types
//! - Conversation types

pub mod audio;
pub mod conversation;
pub mod delta;
pub mod transcript;

pub use audio::{AudioEncoding, AudioFrame, Channels, SampleRate};
pub use conversation::{ConversationSink, InMemoryConversationLog, Turn, TurnRole};
pub use delta::StreamEvent;
pub use transcript::Transcript;
