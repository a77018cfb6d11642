//! Telephony media-stream protocol and bridge
//!
//! The telephony provider speaks JSON control frames over a WebSocket:
//! `connected`, `start` (carrying the stream id), `media` (base64 μ-law
//! payloads), `stop`. The call id arrives earlier, via the voice
//! webhook, on a different connection — the bridge never assumes an
//! order between "connection established" and "stream start".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use voice_gateway_core::AudioFrame;
use voice_gateway_pipeline::{OutboundAudioSink, VoiceSessionOrchestrator};

use crate::TransportError;

/// Inbound control frame from the telephony media stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamFrame {
    Connected {
        #[serde(default)]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        start: Option<StartInfo>,
    },
    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
    },
}

impl MediaStreamFrame {
    /// Parse one inbound text frame.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        serde_json::from_str(raw).map_err(|e| TransportError::Frame(e.to_string()))
    }
}

/// Nested metadata on the `start` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartInfo {
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
}

/// Payload of a `media` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64 μ-law audio
    pub payload: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
}

impl MediaPayload {
    /// Decode the base64 audio payload.
    pub fn decode(&self) -> Result<Vec<u8>, TransportError> {
        BASE64
            .decode(&self.payload)
            .map_err(|e| TransportError::Payload(e.to_string()))
    }
}

/// What the connection loop should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Continue,
    /// `stop` received; the call is over.
    Stop,
}

/// Build an outbound `media` frame referencing the current stream.
pub fn outbound_media_frame(stream_sid: &str, payload_b64: &str, timestamp_ms: u64) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": {
            "timestamp": timestamp_ms.to_string(),
            "track": "outbound",
            "chunk": "0",
            "payload": payload_b64,
        },
    })
    .to_string()
}

/// Per-call bridge between the media stream and the orchestrator.
pub struct TelephonyBridge {
    call_sid: String,
    greeting: String,
    orchestrator: Arc<VoiceSessionOrchestrator>,
    /// Set the instant the greeting is dispatched, never reset for the
    /// lifetime of the call. Deliberately not inferred from whether the
    /// stream id is known: that id can be populated by another code
    /// path before the first media event.
    greeting_sent: AtomicBool,
    stream_sid: Mutex<Option<String>>,
    /// Every live transport connection for this call.
    connections: Mutex<Vec<mpsc::Sender<String>>>,
    started_at: Instant,
}

impl TelephonyBridge {
    pub fn new(
        call_sid: impl Into<String>,
        greeting: impl Into<String>,
        orchestrator: Arc<VoiceSessionOrchestrator>,
    ) -> Self {
        Self {
            call_sid: call_sid.into(),
            greeting: greeting.into(),
            orchestrator,
            greeting_sent: AtomicBool::new(false),
            stream_sid: Mutex::new(None),
            connections: Mutex::new(Vec::new()),
            started_at: Instant::now(),
        }
    }

    pub fn call_sid(&self) -> &str {
        &self.call_sid
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.stream_sid.lock().clone()
    }

    pub fn greeting_sent(&self) -> bool {
        self.greeting_sent.load(Ordering::SeqCst)
    }

    /// Attach one transport connection's outbound queue.
    pub fn register_connection(&self, tx: mpsc::Sender<String>) {
        self.connections.lock().push(tx);
    }

    /// Demultiplex one inbound text frame.
    ///
    /// Malformed frames are logged and skipped: a lost frame degrades
    /// the call, killing the connection over it would end it.
    pub async fn handle_frame(&self, raw: &str) -> FrameDisposition {
        let frame = match MediaStreamFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(call = %self.call_sid, error = %e, "skipping malformed media frame");
                return FrameDisposition::Continue;
            }
        };

        match frame {
            MediaStreamFrame::Connected { .. } => {
                tracing::debug!(call = %self.call_sid, "media stream connected");
                self.maybe_send_greeting().await;
                FrameDisposition::Continue
            }
            MediaStreamFrame::Start { stream_sid, start } => {
                let sid = stream_sid.or(start.and_then(|s| s.stream_sid));
                if let Some(sid) = sid {
                    self.adopt_stream_sid(sid);
                }
                self.maybe_send_greeting().await;
                FrameDisposition::Continue
            }
            MediaStreamFrame::Media { stream_sid, media } => {
                // Tolerate `start` arriving late or on another
                // connection: a media frame also names the stream.
                if let Some(sid) = stream_sid {
                    self.adopt_stream_sid(sid);
                }
                self.maybe_send_greeting().await;
                self.handle_media(&media).await;
                FrameDisposition::Continue
            }
            MediaStreamFrame::Stop { .. } => {
                tracing::info!(call = %self.call_sid, "media stream stopped");
                self.teardown().await;
                FrameDisposition::Stop
            }
        }
    }

    fn adopt_stream_sid(&self, sid: String) {
        let mut current = self.stream_sid.lock();
        if current.as_deref() != Some(sid.as_str()) {
            tracing::debug!(call = %self.call_sid, stream = %sid, "media stream id bound");
            *current = Some(sid);
        }
    }

    /// Dispatch the greeting exactly once per call, whichever event
    /// arrives first. The flag flips before the dispatch completes and
    /// stays set even if synthesis fails.
    async fn maybe_send_greeting(&self) {
        if self.greeting_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(call = %self.call_sid, "dispatching greeting");
        if let Err(e) = self.orchestrator.speak(&self.greeting).await {
            tracing::error!(call = %self.call_sid, error = %e, "greeting synthesis failed");
        }
    }

    async fn handle_media(&self, media: &MediaPayload) {
        let payload = match media.decode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(call = %self.call_sid, error = %e, "skipping undecodable media payload");
                return;
            }
        };
        if payload.is_empty() {
            return;
        }

        self.orchestrator
            .handle_inbound_audio(AudioFrame::mulaw_8k(payload))
            .await;
    }

    /// Release call-scoped state: the orchestrator (and with it both
    /// provider sessions) and the stream binding.
    pub async fn teardown(&self) {
        self.orchestrator.close().await;
        self.stream_sid.lock().take();
        self.connections.lock().clear();
    }
}

impl OutboundAudioSink for TelephonyBridge {
    /// Wrap one normalized μ-law chunk and fan it out to every live
    /// connection for the call. Chunks are delivered in the order TTS
    /// produced them; no audio can be addressed before the stream id is
    /// known.
    fn deliver(&self, frame: &AudioFrame) {
        let Some(stream_sid) = self.stream_sid.lock().clone() else {
            tracing::debug!(call = %self.call_sid, "dropping outbound audio, stream not bound yet");
            return;
        };

        let message = outbound_media_frame(
            &stream_sid,
            &BASE64.encode(&frame.data),
            self.started_at.elapsed().as_millis() as u64,
        );

        let mut connections = self.connections.lock();
        connections.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(call = %self.call_sid, "outbound queue full, dropping chunk");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_frame_with_nested_sid() {
        let raw = r#"{
            "event": "start",
            "sequenceNumber": "1",
            "start": {"accountSid": "AC1", "callSid": "CA1", "streamSid": "MZ1"},
            "streamSid": "MZ1"
        }"#;
        let frame: MediaStreamFrame = serde_json::from_str(raw).unwrap();
        match frame {
            MediaStreamFrame::Start { stream_sid, start } => {
                assert_eq!(stream_sid.as_deref(), Some("MZ1"));
                assert_eq!(start.unwrap().call_sid.as_deref(), Some("CA1"));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_media_frame() {
        let raw = r#"{
            "event": "media",
            "streamSid": "MZ1",
            "media": {"payload": "//8=", "timestamp": "5", "track": "inbound", "chunk": "2"}
        }"#;
        let frame: MediaStreamFrame = serde_json::from_str(raw).unwrap();
        match frame {
            MediaStreamFrame::Media { media, .. } => {
                assert_eq!(media.payload, "//8=");
                assert_eq!(media.track.as_deref(), Some("inbound"));
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_connected_with_extra_fields() {
        let raw = r#"{"event": "connected", "protocol": "Call", "version": "1.0.0"}"#;
        assert!(matches!(
            serde_json::from_str::<MediaStreamFrame>(raw).unwrap(),
            MediaStreamFrame::Connected { .. }
        ));
    }

    #[test]
    fn test_outbound_frame_shape() {
        let message = outbound_media_frame("MZ9", "AAAA", 1234);
        let value: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ9");
        assert_eq!(value["media"]["track"], "outbound");
        assert_eq!(value["media"]["chunk"], "0");
        assert_eq!(value["media"]["timestamp"], "1234");
        assert_eq!(value["media"]["payload"], "AAAA");
    }
}
