//! Google-family request/response synthesis session
//!
//! Each utterance is one HTTP POST; there is no persistent connection,
//! so `connect()` is a no-op and `halt()` is necessarily best-effort.
//! Responses may arrive WAV-wrapped, in which case the `data` subchunk
//! is extracted before normalization.

use std::sync::atomic::{AtomicBool, Ordering};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;

use async_trait::async_trait;
use voice_gateway_codec::wav::{extract_pcm_from_wav, is_wav};
use voice_gateway_core::AudioFrame;

use crate::observer::{CallbackRegistry, SubscriptionId};
use crate::segment::is_speakable;
use crate::tts::{AudioCallback, TextToSpeechSession, TtsOutputFormat};
use crate::{ConnectionState, SessionError};

/// Google TTS session configuration
#[derive(Debug, Clone)]
pub struct GoogleTtsConfig {
    pub api_key: String,
    pub voice_name: String,
    pub language_code: String,
    pub endpoint: String,
    pub output: TtsOutputFormat,
}

impl Default for GoogleTtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_name: "en-US-Neural2-C".to_string(),
            language_code: "en-US".to_string(),
            endpoint: "https://texttospeech.googleapis.com/v1/text:synthesize".to_string(),
            output: TtsOutputFormat::Mulaw8k,
        }
    }
}

/// Request/response Google synthesis session
pub struct GoogleTtsSession {
    config: GoogleTtsConfig,
    http: reqwest::Client,
    callbacks: CallbackRegistry<AudioFrame>,
    closed: AtomicBool,
    in_flight: Mutex<u32>,
}

impl GoogleTtsSession {
    pub fn new(config: GoogleTtsConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            callbacks: CallbackRegistry::new(),
            closed: AtomicBool::new(false),
            in_flight: Mutex::new(0),
        }
    }

    fn synthesis_request(&self, text: &str) -> serde_json::Value {
        let audio_config = match self.config.output {
            TtsOutputFormat::Mulaw8k => serde_json::json!({
                "audioEncoding": "MULAW",
                "sampleRateHertz": 8000,
            }),
            TtsOutputFormat::Native => serde_json::json!({
                "audioEncoding": "LINEAR16",
                "sampleRateHertz": 16000,
            }),
        };

        serde_json::json!({
            "input": { "text": text },
            "voice": {
                "languageCode": self.config.language_code,
                "name": self.config.voice_name,
            },
            "audioConfig": audio_config,
        })
    }
}

#[async_trait]
impl TextToSpeechSession for GoogleTtsSession {
    /// Connection is implicit per-request.
    async fn connect(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            self.closed.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn send_text(&self, text: &str, flush: bool) -> Result<(), SessionError> {
        if !is_speakable(text) {
            tracing::debug!("skipping unspeakable text");
            return Ok(());
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }

        // Every request is already a complete utterance here; the flush
        // mark is informational.
        tracing::debug!(flush, chars = text.len(), "synthesizing utterance");

        *self.in_flight.lock() += 1;
        let result = self.synthesize(text).await;
        *self.in_flight.lock() -= 1;

        let payload = result?;
        if payload.is_empty() {
            // WAV without a data chunk, or an empty synthesis: treated
            // as "no audio produced", not a session failure.
            return Ok(());
        }

        let frame = match self.config.output {
            TtsOutputFormat::Mulaw8k => AudioFrame::mulaw_8k(payload),
            TtsOutputFormat::Native => AudioFrame::pcm16_16k(payload),
        };
        self.callbacks.emit(&frame);
        Ok(())
    }

    fn on_audio(&self, callback: AudioCallback) -> SubscriptionId {
        self.callbacks.subscribe(callback)
    }

    fn off_audio(&self, id: SubscriptionId) {
        self.callbacks.unsubscribe(id);
    }

    /// Best-effort no-op: an in-flight HTTP exchange cannot be aborted
    /// without cancelling the pending future, which the orchestrator
    /// owns. Logged for observability.
    async fn halt(&self) -> Result<(), SessionError> {
        let in_flight = *self.in_flight.lock();
        tracing::debug!(in_flight, "halt requested on request/response session");
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::SeqCst) {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Connected
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl GoogleTtsSession {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SessionError> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&self.synthesis_request(text))
            .send()
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        match response.status().as_u16() {
            401 | 403 => {
                return Err(SessionError::Auth(format!(
                    "synthesis rejected with {}",
                    response.status()
                )))
            }
            status if status >= 400 => {
                return Err(SessionError::Connection(format!(
                    "synthesis failed with {status}"
                )))
            }
            _ => {}
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SessionError::Decode(e.to_string()))?;

        decode_audio_content(&body)
    }
}

/// Pull the audio payload out of a synthesis response, unwrapping a WAV
/// container when present.
fn decode_audio_content(body: &serde_json::Value) -> Result<Vec<u8>, SessionError> {
    let audio_b64 = body
        .get("audioContent")
        .and_then(|a| a.as_str())
        .ok_or_else(|| SessionError::Decode("response without audioContent".to_string()))?;

    let bytes = BASE64
        .decode(audio_b64)
        .map_err(|e| SessionError::Decode(e.to_string()))?;

    if is_wav(&bytes) {
        return Ok(extract_pcm_from_wav(&bytes));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn wav_wrapped(payload: &[u8]) -> Vec<u8> {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(payload);
        wav
    }

    #[test]
    fn test_decode_raw_audio_content() {
        let payload = vec![0x7Fu8, 0xFF, 0x00, 0x80];
        let body = serde_json::json!({ "audioContent": BASE64.encode(&payload) });
        assert_eq!(decode_audio_content(&body).unwrap(), payload);
    }

    #[test]
    fn test_decode_unwraps_wav() {
        let payload = vec![1u8, 2, 3, 4, 5, 6];
        let body = serde_json::json!({ "audioContent": BASE64.encode(wav_wrapped(&payload)) });
        assert_eq!(decode_audio_content(&body).unwrap(), payload);
    }

    #[test]
    fn test_decode_missing_content_is_an_error() {
        let body = serde_json::json!({ "unexpected": true });
        assert!(matches!(
            decode_audio_content(&body),
            Err(SessionError::Decode(_))
        ));
    }

    #[test]
    fn test_request_shape_for_telephony() {
        let session = GoogleTtsSession::new(GoogleTtsConfig::default());
        let request = session.synthesis_request("hello");

        assert_eq!(request["input"]["text"], "hello");
        assert_eq!(request["voice"]["languageCode"], "en-US");
        assert_eq!(request["audioConfig"]["audioEncoding"], "MULAW");
        assert_eq!(request["audioConfig"]["sampleRateHertz"], 8000);
    }

    #[tokio::test]
    async fn test_unspeakable_text_makes_no_provider_call() {
        // The guard runs before any HTTP traffic; with an unroutable
        // endpoint this would error if a request were attempted.
        let session = GoogleTtsSession::new(GoogleTtsConfig {
            endpoint: "http://127.0.0.1:1/unroutable".to_string(),
            ..GoogleTtsConfig::default()
        });

        let fired = Arc::new(AtomicBool::new(false));
        let fired_cb = Arc::clone(&fired);
        session.on_audio(Box::new(move |_| fired_cb.store(true, Ordering::SeqCst)));

        assert!(session.send_text("", true).await.is_ok());
        assert!(session.send_text("   ", true).await.is_ok());
        assert!(session.send_text(".", true).await.is_ok());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_after_close_is_surfaced() {
        let session = GoogleTtsSession::new(GoogleTtsConfig::default());
        session.close().await;
        let result = session.send_text("real words", true).await;
        assert!(matches!(result, Err(SessionError::Closed)));
    }

    #[tokio::test]
    async fn test_halt_is_a_noop() {
        let session = GoogleTtsSession::new(GoogleTtsConfig::default());
        assert!(session.halt().await.is_ok());
        assert_eq!(session.state(), ConnectionState::Connected);
    }
}
