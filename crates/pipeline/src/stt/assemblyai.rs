//! AssemblyAI-family live transcription session
//!
//! Sessions authenticate with short-lived tokens minted over HTTP; the
//! token is cached and only re-minted inside an expiry margin. Audio
//! travels as base64 JSON messages. Reconnect policy: exponential
//! backoff with a bounded attempt budget; exhausting it parks the
//! session in a terminal `Failed` state that only an explicit
//! `connect()` leaves.

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
use voice_gateway_core::{AudioFrame, Transcript};

use crate::observer::{CallbackRegistry, SubscriptionId};
use crate::reconnect::{ReconnectPolicy, ReconnectSchedule};
use crate::stt::{SpeechToTextSession, TranscriptionCallback};
use crate::ws;
use crate::{ConnectionState, SessionError};

/// AssemblyAI session configuration
#[derive(Debug, Clone)]
pub struct AssemblyAiConfig {
    pub api_key: String,
    pub sample_rate: u32,
    pub endpoint: String,
    pub token_endpoint: String,
    /// Lifetime requested for minted tokens
    pub token_ttl: Duration,
    /// Re-mint when the cached token is this close to expiring
    pub token_expiry_margin: Duration,
    pub auto_reconnect: bool,
    pub backoff_base: Duration,
    pub max_reconnect_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for AssemblyAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sample_rate: 8000,
            endpoint: "wss://api.assemblyai.com/v2/realtime/ws".to_string(),
            token_endpoint: "https://api.assemblyai.com/v2/realtime/token".to_string(),
            token_ttl: Duration::from_secs(3600),
            token_expiry_margin: Duration::from_secs(30),
            auto_reconnect: true,
            backoff_base: Duration::from_millis(1000),
            max_reconnect_attempts: 3,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Cached ephemeral token with expiry tracking.
///
/// A token is handed out until it is within the expiry margin of its
/// deadline; only then is a new one minted. Never one mint per connect.
pub(crate) struct TokenCache {
    margin: Duration,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl TokenCache {
    pub(crate) fn new(margin: Duration) -> Self {
        Self {
            margin,
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn valid_at(&self, now: Instant) -> Option<String> {
        let cached = self.cached.lock();
        let entry = cached.as_ref()?;
        if entry.expires_at.checked_duration_since(now)? > self.margin {
            Some(entry.token.clone())
        } else {
            None
        }
    }

    pub(crate) fn store(&self, token: String, ttl: Duration, now: Instant) {
        *self.cached.lock() = Some(CachedToken {
            token,
            expires_at: now + ttl,
        });
    }
}

struct Inner {
    config: AssemblyAiConfig,
    http: reqwest::Client,
    tokens: TokenCache,
    state: Mutex<ConnectionState>,
    audio_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    callbacks: CallbackRegistry<Transcript>,
    want_connected: AtomicBool,
    reconnecting: AtomicBool,
    connect_gate: tokio::sync::Mutex<()>,
}

/// Live AssemblyAI transcription session
pub struct AssemblyAiSession {
    inner: Arc<Inner>,
}

impl AssemblyAiSession {
    pub fn new(config: AssemblyAiConfig) -> Self {
        let tokens = TokenCache::new(config.token_expiry_margin);
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                tokens,
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
impl SpeechToTextSession for AssemblyAiSession {
    async fn connect(&self) -> Result<(), SessionError> {
        let _gate = self.inner.connect_gate.lock().await;
        if *self.inner.state.lock() == ConnectionState::Connected {
            return Ok(());
        }

        // An explicit connect leaves the terminal Failed state and
        // restores the retry budget.
        self.inner.want_connected.store(true, Ordering::SeqCst);
        *self.inner.state.lock() = ConnectionState::Connecting;

        establish(&self.inner).await.inspect_err(|_| {
            *self.inner.state.lock() = ConnectionState::Disconnected;
        })
    }

    async fn send_audio(&self, frame: AudioFrame) -> Result<(), SessionError> {
        if *self.inner.state.lock() == ConnectionState::Failed {
            return Err(SessionError::RetriesExhausted(
                self.inner.config.max_reconnect_attempts,
            ));
        }

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
        self.inner.want_connected.store(false, Ordering::SeqCst);
        self.inner.audio_tx.lock().take();
        *self.inner.state.lock() = ConnectionState::Disconnected;
    }
}

/// Mint or reuse an ephemeral realtime token.
async fn session_token(inner: &Inner) -> Result<String, SessionError> {
    if let Some(token) = inner.tokens.valid_at(Instant::now()) {
        return Ok(token);
    }

    let response = inner
        .http
        .post(&inner.config.token_endpoint)
        .header("authorization", &inner.config.api_key)
        .json(&serde_json::json!({
            "expires_in": inner.config.token_ttl.as_secs(),
        }))
        .send()
        .await
        .map_err(|e| SessionError::Connection(e.to_string()))?;

    match response.status().as_u16() {
        401 | 403 => {
            return Err(SessionError::Auth(format!(
                "token mint rejected with {}",
                response.status()
            )))
        }
        status if status >= 400 => {
            return Err(SessionError::Connection(format!(
                "token mint failed with {status}"
            )))
        }
        _ => {}
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| SessionError::Decode(e.to_string()))?;
    let token = body
        .get("token")
        .and_then(|t| t.as_str())
        .ok_or_else(|| SessionError::Decode("token response without token".to_string()))?
        .to_string();

    inner
        .tokens
        .store(token.clone(), inner.config.token_ttl, Instant::now());
    Ok(token)
}

/// Open the socket and attach the I/O tasks.
async fn establish(inner: &Arc<Inner>) -> Result<(), SessionError> {
    let token = session_token(inner).await?;
    let url = format!(
        "{}?sample_rate={}&token={}",
        inner.config.endpoint, inner.config.sample_rate, token
    );

    let stream = ws::connect_with_timeout(&url, &[], inner.config.connect_timeout).await?;
    let (mut write, mut read) = stream.split();

    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
    *inner.audio_tx.lock() = Some(audio_tx);
    *inner.state.lock() = ConnectionState::Connected;
    tracing::info!("assemblyai session connected");

    // Writer: audio goes out as base64 JSON messages.
    tokio::spawn(async move {
        while let Some(bytes) = audio_rx.recv().await {
            let message = serde_json::json!({ "audio_data": BASE64.encode(bytes) });
            if write.send(Message::text(message.to_string())).await.is_err() {
                break;
            }
        }
        let terminate = serde_json::json!({ "terminate_session": true });
        let _ = write.send(Message::text(terminate.to_string())).await;
        let _ = write.send(Message::Close(None)).await;
    });

    // Reader: transcript events in.
    let reader_inner = Arc::clone(inner);
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => match parse_event(text.as_str()) {
                    Ok(Some(transcript)) => reader_inner.callbacks.emit(&transcript),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unparseable assemblyai event")
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "assemblyai socket error");
                    break;
                }
            }
        }
        on_connection_lost(&reader_inner);
    });

    Ok(())
}

/// Socket dropped: exponential backoff while wanted, terminal `Failed`
/// once the attempt budget is spent.
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
        let mut schedule = ReconnectSchedule::new(ReconnectPolicy::ExponentialBackoff {
            base: inner.config.backoff_base,
            max_attempts: inner.config.max_reconnect_attempts,
        });

        loop {
            let Some(delay) = schedule.next_delay() else {
                *inner.state.lock() = ConnectionState::Failed;
                tracing::error!(
                    attempts = inner.config.max_reconnect_attempts,
                    "assemblyai reconnect budget exhausted, session failed"
                );
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
                        "assemblyai reconnect failed"
                    );
                }
            }
        }
        inner.reconnecting.store(false, Ordering::SeqCst);
    });
}

/// Normalize one provider event to a transcript.
fn parse_event(raw: &str) -> Result<Option<Transcript>, SessionError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SessionError::Decode(e.to_string()))?;

    let kind = value
        .get("message_type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| SessionError::Decode("event without message_type".to_string()))?;

    let is_final = match kind {
        "PartialTranscript" => false,
        "FinalTranscript" => true,
        // SessionBegins, SessionTerminated, and friends carry no text.
        _ => return Ok(None),
    };

    let text = value
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    let confidence = value
        .get("confidence")
        .and_then(|c| c.as_f64())
        .unwrap_or(0.0) as f32;

    if text.is_empty() && !is_final {
        return Ok(None);
    }

    Ok(Some(Transcript::new(text, is_final, confidence)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_cache_reuses_fresh_token() {
        let cache = TokenCache::new(Duration::from_secs(30));
        let now = Instant::now();
        cache.store("tok-1".to_string(), Duration::from_secs(3600), now);

        assert_eq!(cache.valid_at(now), Some("tok-1".to_string()));
        // Still comfortably outside the margin an hour minus a minute in.
        let later = now + Duration::from_secs(3600 - 60);
        assert_eq!(cache.valid_at(later), Some("tok-1".to_string()));
    }

    #[test]
    fn test_token_cache_expires_within_margin() {
        let cache = TokenCache::new(Duration::from_secs(30));
        let now = Instant::now();
        cache.store("tok-1".to_string(), Duration::from_secs(60), now);

        // 31s in: 29s of life left, inside the 30s margin.
        let near_expiry = now + Duration::from_secs(31);
        assert_eq!(cache.valid_at(near_expiry), None);
        // Past expiry entirely.
        let expired = now + Duration::from_secs(120);
        assert_eq!(cache.valid_at(expired), None);
    }

    #[test]
    fn test_token_cache_empty() {
        let cache = TokenCache::new(Duration::from_secs(30));
        assert_eq!(cache.valid_at(Instant::now()), None);
    }

    #[test]
    fn test_parse_partial_and_final() {
        let partial = r#"{"message_type": "PartialTranscript", "text": "what's", "confidence": 0.8}"#;
        let t = parse_event(partial).unwrap().unwrap();
        assert!(!t.is_final);
        assert_eq!(t.text, "what's");

        let final_ = r#"{"message_type": "FinalTranscript", "text": "what's up", "confidence": 0.95}"#;
        let t = parse_event(final_).unwrap().unwrap();
        assert!(t.is_final);
        assert_eq!(t.text, "what's up");
    }

    #[test]
    fn test_session_control_events_are_skipped() {
        let raw = r#"{"message_type": "SessionBegins", "session_id": "abc"}"#;
        assert!(parse_event(raw).unwrap().is_none());
    }

    #[test]
    fn test_event_without_type_is_a_decode_error() {
        assert!(matches!(
            parse_event(r#"{"text": "hello"}"#),
            Err(SessionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_send_audio_after_terminal_failure() {
        let session = AssemblyAiSession::new(AssemblyAiConfig::default());
        *session.inner.state.lock() = ConnectionState::Failed;

        let result = session
            .send_audio(AudioFrame::mulaw_8k(vec![0xFF; 160]))
            .await;
        assert!(matches!(result, Err(SessionError::RetriesExhausted(3))));
    }
}
