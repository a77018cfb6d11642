//! ElevenLabs-family streaming synthesis session
//!
//! Text goes out incrementally over a persistent WebSocket with flush
//! marks at utterance boundaries; base64 audio events come back. The
//! provider returns 16kHz linear PCM, which the session normalizes to
//! the configured output format before anyone downstream sees it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use async_trait::async_trait;
use voice_gateway_codec::pcm16_16k_bytes_to_mulaw_8k;
use voice_gateway_core::AudioFrame;

use crate::observer::{CallbackRegistry, SubscriptionId};
use crate::segment::is_speakable;
use crate::tts::{AudioCallback, TextToSpeechSession, TtsOutputFormat};
use crate::ws;
use crate::{ConnectionState, SessionError};

/// ElevenLabs session configuration
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    pub model: String,
    pub endpoint: String,
    pub output: TtsOutputFormat,
    /// Idle keep-alive interval; the provider drops silent sessions.
    pub keepalive_interval: Duration,
    pub connect_timeout: Duration,
    pub stability: f32,
    pub similarity_boost: f32,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model: "eleven_turbo_v2".to_string(),
            endpoint: "wss://api.elevenlabs.io".to_string(),
            output: TtsOutputFormat::Mulaw8k,
            keepalive_interval: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

impl ElevenLabsConfig {
    fn stream_url(&self) -> String {
        // pcm_16000 regardless of target: normalization happens here,
        // not at the provider.
        format!(
            "{}/v1/text-to-speech/{}/stream-input?model_id={}&output_format=pcm_16000",
            self.endpoint, self.voice_id, self.model
        )
    }
}

struct Inner {
    config: ElevenLabsConfig,
    state: Mutex<ConnectionState>,
    text_tx: Mutex<Option<mpsc::Sender<String>>>,
    callbacks: CallbackRegistry<AudioFrame>,
    want_connected: AtomicBool,
    last_send: Mutex<Instant>,
    connect_gate: tokio::sync::Mutex<()>,
}

/// Live ElevenLabs streaming synthesis session
pub struct ElevenLabsSession {
    inner: Arc<Inner>,
}

impl ElevenLabsSession {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                text_tx: Mutex::new(None),
                callbacks: CallbackRegistry::new(),
                want_connected: AtomicBool::new(false),
                last_send: Mutex::new(Instant::now()),
                connect_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

#[async_trait]
impl TextToSpeechSession for ElevenLabsSession {
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

    async fn send_text(&self, text: &str, flush: bool) -> Result<(), SessionError> {
        if !is_speakable(text) {
            tracing::debug!("skipping unspeakable text");
            return Ok(());
        }

        let tx = self
            .inner
            .text_tx
            .lock()
            .clone()
            .ok_or(SessionError::NotConnected)?;

        // The provider expects chunks to end with a space.
        let message = serde_json::json!({
            "text": format!("{} ", text.trim()),
            "flush": flush,
        });

        tx.send(message.to_string())
            .await
            .map_err(|_| SessionError::NotConnected)?;
        *self.inner.last_send.lock() = Instant::now();
        Ok(())
    }

    fn on_audio(&self, callback: AudioCallback) -> SubscriptionId {
        self.inner.callbacks.subscribe(callback)
    }

    fn off_audio(&self, id: SubscriptionId) {
        self.inner.callbacks.unsubscribe(id);
    }

    /// Interrupt: an end-of-stream control message terminates the
    /// current synthesis immediately. The session goes back to
    /// `Disconnected`; the next utterance re-opens it via `connect()`.
    async fn halt(&self) -> Result<(), SessionError> {
        let tx = self.inner.text_tx.lock().take();
        *self.inner.state.lock() = ConnectionState::Disconnected;

        if let Some(tx) = tx {
            let eos = serde_json::json!({ "text": "" });
            let _ = tx.send(eos.to_string()).await;
            tracing::debug!("elevenlabs synthesis interrupted");
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    async fn close(&self) {
        self.inner.want_connected.store(false, Ordering::SeqCst);
        let tx = self.inner.text_tx.lock().take();
        if let Some(tx) = tx {
            let eos = serde_json::json!({ "text": "" });
            let _ = tx.send(eos.to_string()).await;
        }
        *self.inner.state.lock() = ConnectionState::Disconnected;
    }
}

/// Open the socket, send the configuration handshake, attach tasks.
async fn establish(inner: &Arc<Inner>) -> Result<(), SessionError> {
    let url = inner.config.stream_url();
    let stream = ws::connect_with_timeout(&url, &[], inner.config.connect_timeout).await?;
    let (mut write, mut read) = stream.split();

    // Voice and credential handshake opens the logical stream.
    let handshake = serde_json::json!({
        "text": " ",
        "voice_settings": {
            "stability": inner.config.stability,
            "similarity_boost": inner.config.similarity_boost,
        },
        "xi_api_key": inner.config.api_key,
    });
    write
        .send(Message::text(handshake.to_string()))
        .await
        .map_err(|e| SessionError::Connection(e.to_string()))?;

    let (text_tx, mut text_rx) = mpsc::channel::<String>(32);
    *inner.text_tx.lock() = Some(text_tx.clone());
    *inner.state.lock() = ConnectionState::Connected;
    *inner.last_send.lock() = Instant::now();
    tracing::info!(voice = %inner.config.voice_id, "elevenlabs session connected");

    // Writer: text messages out.
    tokio::spawn(async move {
        while let Some(message) = text_rx.recv().await {
            if write.send(Message::text(message)).await.is_err() {
                break;
            }
        }
        let _ = write.send(Message::Close(None)).await;
    });

    // Keep-alive: whitespace message on a fixed idle interval so the
    // provider does not drop the session between utterances.
    let keepalive_inner = Arc::clone(inner);
    let keepalive_tx = text_tx;
    tokio::spawn(async move {
        let interval = keepalive_inner.config.keepalive_interval;
        loop {
            tokio::time::sleep(interval).await;
            if !keepalive_inner.want_connected.load(Ordering::SeqCst) {
                break;
            }
            if keepalive_inner.text_tx.lock().is_none() {
                break;
            }
            let idle_for = keepalive_inner.last_send.lock().elapsed();
            if idle_for >= interval {
                let keepalive = serde_json::json!({ "text": " " });
                if keepalive_tx.send(keepalive.to_string()).await.is_err() {
                    break;
                }
                *keepalive_inner.last_send.lock() = Instant::now();
            }
        }
    });

    // Reader: audio events in, normalized before emission.
    let reader_inner = Arc::clone(inner);
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    match parse_audio_event(text.as_str(), reader_inner.config.output) {
                        Ok(Some(frame)) => reader_inner.callbacks.emit(&frame),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "dropping unparseable elevenlabs event")
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "elevenlabs socket error");
                    break;
                }
            }
        }
        // Streaming synthesis sessions are per-utterance-run; the
        // orchestrator reconnects lazily, so no reconnect timer here.
        reader_inner.text_tx.lock().take();
        if reader_inner.want_connected.load(Ordering::SeqCst) {
            *reader_inner.state.lock() = ConnectionState::Disconnected;
        }
    });

    Ok(())
}

/// Normalize one provider event to an audio frame.
fn parse_audio_event(
    raw: &str,
    output: TtsOutputFormat,
) -> Result<Option<AudioFrame>, SessionError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SessionError::Decode(e.to_string()))?;

    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return Err(SessionError::Decode(format!("provider error: {error}")));
    }

    let Some(audio_b64) = value.get("audio").and_then(|a| a.as_str()) else {
        // isFinal markers and alignment events carry no audio.
        return Ok(None);
    };

    let pcm = BASE64
        .decode(audio_b64)
        .map_err(|e| SessionError::Decode(e.to_string()))?;
    if pcm.is_empty() {
        return Ok(None);
    }

    let frame = match output {
        TtsOutputFormat::Mulaw8k => AudioFrame::mulaw_8k(pcm16_16k_bytes_to_mulaw_8k(&pcm)),
        TtsOutputFormat::Native => AudioFrame::pcm16_16k(pcm),
    };
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::AudioEncoding;

    #[test]
    fn test_parse_audio_event_normalizes_to_mulaw() {
        // 8 PCM16 samples at 16kHz -> 4 μ-law bytes at 8kHz.
        let pcm: Vec<u8> = vec![0; 16];
        let raw = serde_json::json!({ "audio": BASE64.encode(&pcm), "isFinal": false });

        let frame = parse_audio_event(&raw.to_string(), TtsOutputFormat::Mulaw8k)
            .unwrap()
            .unwrap();
        assert_eq!(frame.encoding, AudioEncoding::MuLaw);
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_parse_audio_event_native_passthrough() {
        let pcm: Vec<u8> = vec![1, 2, 3, 4];
        let raw = serde_json::json!({ "audio": BASE64.encode(&pcm) });

        let frame = parse_audio_event(&raw.to_string(), TtsOutputFormat::Native)
            .unwrap()
            .unwrap();
        assert_eq!(frame.encoding, AudioEncoding::LinearPcm16);
        assert_eq!(frame.data, pcm);
    }

    #[test]
    fn test_final_marker_without_audio_is_skipped() {
        let raw = r#"{"isFinal": true}"#;
        assert!(parse_audio_event(raw, TtsOutputFormat::Mulaw8k)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_provider_error_is_a_decode_error() {
        let raw = r#"{"error": "quota exceeded"}"#;
        assert!(matches!(
            parse_audio_event(raw, TtsOutputFormat::Mulaw8k),
            Err(SessionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unspeakable_text_is_a_local_no_op() {
        let session = ElevenLabsSession::new(ElevenLabsConfig::default());
        let fired = Arc::new(AtomicBool::new(false));
        let fired_cb = Arc::clone(&fired);
        session.on_audio(Box::new(move |_| fired_cb.store(true, Ordering::SeqCst)));

        // No connection, no provider call, no audio callback.
        assert!(session.send_text("", true).await.is_ok());
        assert!(session.send_text("   ", true).await.is_ok());
        assert!(session.send_text(".", true).await.is_ok());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_text_without_session_is_surfaced() {
        let session = ElevenLabsSession::new(ElevenLabsConfig::default());
        let result = session.send_text("real words", true).await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_halt_without_session_is_safe() {
        let session = ElevenLabsSession::new(ElevenLabsConfig::default());
        assert!(session.halt().await.is_ok());
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_stream_url_shape() {
        let config = ElevenLabsConfig::default();
        let url = config.stream_url();
        assert!(url.contains("/stream-input?"));
        assert!(url.contains("output_format=pcm_16000"));
    }
}
