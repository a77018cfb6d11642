//! Browser audio WebSocket messages
//!
//! Inbound mic audio arrives as raw binary WebSocket frames; outbound
//! synthesized audio goes back as JSON `audio-chunk` messages carrying
//! base64 payloads for client-side decode.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use voice_gateway_core::AudioFrame;

/// Outbound JSON text frame to the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BrowserMessage {
    AudioChunk { data: String },
}

/// Wrap one synthesized frame for the browser.
pub fn audio_chunk_message(frame: &AudioFrame) -> String {
    let message = BrowserMessage::AudioChunk {
        data: BASE64.encode(&frame.data),
    };
    serde_json::to_string(&message).unwrap_or_default()
}
