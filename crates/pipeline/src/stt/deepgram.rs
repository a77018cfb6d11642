//! Deepgram-family live transcription session
//!
//! Binary audio out over a persistent WebSocket, JSON result events in.
//! Reconnect policy: fixed delay, retried for as long as the session is
//! wanted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use async_trait::async_trait;
use voice_gateway_core::{AudioFrame, Transcript};

use crate::observer::{CallbackRegistry, SubscriptionId};
use crate::reconnect::{ReconnectPolicy, ReconnectSchedule};
use crate::stt::{SpeechToTextSession, TranscriptionCallback};
use crate::ws;
use crate::{ConnectionState, SessionError};

/// Deepgram session configuration
#[derive(Debug, Clone)]
pub struct DeepgramConfig {
    pub api_key: String,
    pub model: String,
    pub language: String,
    /// Sample rate of the audio the transport feeds us
    pub sample_rate: u32,
    /// Declared input encoding; telephony feeds μ-law
    pub encoding: String,
    pub endpoint: String,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "nova-2".to_string(),
            language: "en".to_string(),
            sample_rate: 8000,
            encoding: "mulaw".to_string(),
            endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl DeepgramConfig {
    /// Session-open URL with provider query parameters.
    fn listen_url(&self) -> Result<String, SessionError> {
        let mut url =
            Url::parse(&self.endpoint).map_err(|e| SessionError::Connection(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("model", &self.model)
            .append_pair("language", &self.language)
            .append_pair("encoding", &self.encoding)
            .append_pair("sample_rate", &self.sample_rate.to_string())
            .append_pair("channels", "1")
            .append_pair("punctuate", "true")
            .append_pair("interim_results", "true");
        Ok(url.to_string())
    }
}

struct Inner {
    config: DeepgramConfig,
    state: Mutex<ConnectionState>,
    audio_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    callbacks: CallbackRegistry<Transcript>,
    /// Checked by reconnect timers before acting so a stale attempt
    /// cannot resurrect a deliberately closed session.
    want_connected: AtomicBool,
    reconnecting: AtomicBool,
    connect_gate: tokio::sync::Mutex<()>,
}

/// Live Deepgram transcription session
pub struct DeepgramSession {
    inner: Arc<Inner>,
}

impl DeepgramSession {
    pub fn new(config: DeepgramConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                audio_tx: Mutex::new(None),
                callbacks: CallbackRegistry::new(),
                want_connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                connect_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

#[async_trait]
impl SpeechToTextSession for DeepgramSession {
    async fn connect(&self) -> Result<(), SessionError> {
        let _gate = self.inner.connect_gate.lock().await;
        if *self.inner.state.lock() == ConnectionState::Connected {
            return Ok(());
        }

        self.inner.want_connected.store(true, Ordering::SeqCst);
        *self.inner.state.lock() = ConnectionState::Connecting;

        establish(&self.inner).await.inspect_err(|_| {
            *self.inner.state.lock() = ConnectionState::Disconnected;
        })
    }

    async fn send_audio(&self, frame: AudioFrame) -> Result<(), SessionError> {
        let sender = self.inner.audio_tx.lock().clone();
        if let Some(tx) = sender {
            if tx.send(frame.data.clone()).await.is_ok() {
                return Ok(());
            }
        }

        if !self.inner.config.auto_reconnect {
            return Err(SessionError::NotConnected);
        }

        // One implicit reconnect, one retry, then the chunk is dropped.
        self.connect().await?;
        let tx = self
            .inner
            .audio_tx
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected)?;
        tx.send(frame.data)
            .await
            .map_err(|_| SessionError::NotConnected)
    }

    fn on_transcription(&self, callback: TranscriptionCallback) -> SubscriptionId {
        self.inner.callbacks.subscribe(callback)
    }

    fn off_transcription(&self, id: SubscriptionId) {
        self.inner.callbacks.unsubscribe(id);
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    async fn close(&self) {
        // Disable reconnect before tearing the socket down.
        self.inner.want_connected.store(false, Ordering::SeqCst);
        self.inner.audio_tx.lock().take();
        *self.inner.state.lock() = ConnectionState::Disconnected;
    }
}

/// Open the socket and attach the I/O tasks.
async fn establish(inner: &Arc<Inner>) -> Result<(), SessionError> {
    let url = inner.config.listen_url()?;
    let headers = [(
        "Authorization",
        format!("Token {}", inner.config.api_key),
    )];

    let stream = ws::connect_with_timeout(&url, &headers, inner.config.connect_timeout).await?;
    let (mut write, mut read) = stream.split();

    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
    *inner.audio_tx.lock() = Some(audio_tx);
    *inner.state.lock() = ConnectionState::Connected;
    tracing::info!(model = %inner.config.model, "deepgram session connected");

    // Writer: audio frames out as binary messages.
    tokio::spawn(async move {
        while let Some(bytes) = audio_rx.recv().await {
            if write.send(Message::binary(bytes)).await.is_err() {
                break;
            }
        }
        let _ = write.send(Message::Close(None)).await;
    });

    // Reader: result events in, normalized to Transcript.
    let reader_inner = Arc::clone(inner);
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => match parse_event(text.as_str()) {
                    Ok(Some(transcript)) => reader_inner.callbacks.emit(&transcript),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "dropping unparseable deepgram event"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "deepgram socket error");
                    break;
                }
            }
        }
        on_connection_lost(&reader_inner);
    });

    Ok(())
}

/// Socket dropped out from under us: schedule fixed-delay reconnects
/// while the session is still wanted.
fn on_connection_lost(inner: &Arc<Inner>) {
    inner.audio_tx.lock().take();

    if !inner.want_connected.load(Ordering::SeqCst) {
        return;
    }
    *inner.state.lock() = ConnectionState::Disconnected;

    if !inner.config.auto_reconnect || inner.reconnecting.swap(true, Ordering::SeqCst) {
        return;
    }

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::FixedDelay {
            delay: inner.config.reconnect_delay,
        });

        loop {
            let Some(delay) = schedule.next_delay() else {
                break;
            };
            tokio::time::sleep(delay).await;

            if !inner.want_connected.load(Ordering::SeqCst) {
                break;
            }

            let _gate = inner.connect_gate.lock().await;
            if *inner.state.lock() == ConnectionState::Connected {
                break;
            }
            *inner.state.lock() = ConnectionState::Connecting;

            match establish(&inner).await {
                Ok(()) => break,
                Err(e) => {
                    *inner.state.lock() = ConnectionState::Disconnected;
                    tracing::warn!(
                        attempt = schedule.attempts(),
                        error = %e,
                        "deepgram reconnect failed"
                    );
                }
            }
        }
        inner.reconnecting.store(false, Ordering::SeqCst);
    });
}

/// Normalize one provider event to a transcript.
///
/// Non-result events (metadata, utterance markers) normalize to `None`.
fn parse_event(raw: &str) -> Result<Option<Transcript>, SessionError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SessionError::Decode(e.to_string()))?;

    if value.get("type").and_then(|t| t.as_str()) != Some("Results") {
        return Ok(None);
    }

    let alternative = value
        .pointer("/channel/alternatives/0")
        .ok_or_else(|| SessionError::Decode("result without alternatives".to_string()))?;

    let text = alternative
        .get("transcript")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    let confidence = alternative
        .get("confidence")
        .and_then(|c| c.as_f64())
        .unwrap_or(0.0) as f32;

    // speech_final marks the end of an utterance; is_final alone only
    // finalizes a segment within it.
    let is_final = value
        .get("speech_final")
        .and_then(|f| f.as_bool())
        .unwrap_or(false);

    if text.is_empty() && !is_final {
        return Ok(None);
    }

    Ok(Some(Transcript::new(text, is_final, confidence)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_result() {
        let raw = r#"{
            "type": "Results",
            "is_final": false,
            "speech_final": false,
            "channel": {"alternatives": [{"transcript": "what's the", "confidence": 0.92}]}
        }"#;
        let transcript = parse_event(raw).unwrap().unwrap();
        assert_eq!(transcript.text, "what's the");
        assert!(!transcript.is_final);
        assert!((transcript.confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_parse_final_result() {
        let raw = r#"{
            "type": "Results",
            "is_final": true,
            "speech_final": true,
            "channel": {"alternatives": [{"transcript": "what's the weather in Seattle", "confidence": 0.98}]}
        }"#;
        let transcript = parse_event(raw).unwrap().unwrap();
        assert!(transcript.is_final);
        assert_eq!(transcript.text, "what's the weather in Seattle");
    }

    #[test]
    fn test_metadata_events_are_skipped() {
        let raw = r#"{"type": "Metadata", "request_id": "abc"}"#;
        assert!(parse_event(raw).unwrap().is_none());
    }

    #[test]
    fn test_empty_partial_is_skipped() {
        let raw = r#"{
            "type": "Results",
            "speech_final": false,
            "channel": {"alternatives": [{"transcript": "", "confidence": 0.0}]}
        }"#;
        assert!(parse_event(raw).unwrap().is_none());
    }

    #[test]
    fn test_malformed_json_is_a_decode_error() {
        assert!(matches!(
            parse_event("not json"),
            Err(SessionError::Decode(_))
        ));
        assert!(matches!(
            parse_event(r#"{"type": "Results"}"#),
            Err(SessionError::Decode(_))
        ));
    }

    #[test]
    fn test_listen_url_carries_session_params() {
        let config = DeepgramConfig {
            api_key: "key".to_string(),
            ..DeepgramConfig::default()
        };
        let url = config.listen_url().unwrap();
        assert!(url.starts_with("wss://api.deepgram.com/v1/listen?"));
        assert!(url.contains("encoding=mulaw"));
        assert!(url.contains("sample_rate=8000"));
        assert!(url.contains("interim_results=true"));
    }

    #[tokio::test]
    async fn test_send_audio_without_session_fails() {
        let session = DeepgramSession::new(DeepgramConfig {
            auto_reconnect: false,
            ..DeepgramConfig::default()
        });
        let result = session
            .send_audio(AudioFrame::mulaw_8k(vec![0xFF; 160]))
            .await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let session = DeepgramSession::new(DeepgramConfig::default());
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
