//! Transport layer for the voice gateway
//!
//! Adapts the telephony provider's framed media-stream protocol and the
//! browser audio WebSocket onto the voice session orchestrator.

pub mod browser;
pub mod telephony;
pub mod twiml;

pub use browser::BrowserMessage;
pub use telephony::{
    FrameDisposition, MediaPayload, MediaStreamFrame, StartInfo, TelephonyBridge,
};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("malformed media frame: {0}")]
    Frame(String),

    #[error("invalid payload encoding: {0}")]
    Payload(String),
}

/// Telephony call statuses that release call-scoped resources.
pub fn is_terminal_call_status(status: &str) -> bool {
    matches!(status, "completed" | "busy" | "no-answer" | "canceled")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        for status in ["completed", "busy", "no-answer", "canceled"] {
            assert!(is_terminal_call_status(status));
        }
        for status in ["ringing", "in-progress", "queued", ""] {
            assert!(!is_terminal_call_status(status));
        }
    }
}
