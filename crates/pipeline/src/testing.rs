//! In-process provider sessions
//!
//! Network-free stand-ins for the provider adapters, used by the test
//! suites and by offline runs of the gateway. Transcripts are injected
//! by hand; synthesis records every utterance and answers with a fixed
//! μ-law frame so the downstream transport path is exercised.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use voice_gateway_core::{AudioFrame, Transcript};

use crate::observer::{CallbackRegistry, SubscriptionId};
use crate::stt::{SpeechToTextSession, TranscriptionCallback};
use crate::tts::{AudioCallback, TextToSpeechSession};
use crate::{ConnectionState, SessionError};

/// STT session whose transcripts are injected by the test.
pub struct InjectedSpeechToText {
    callbacks: CallbackRegistry<Transcript>,
    state: Mutex<ConnectionState>,
    received: Mutex<Vec<AudioFrame>>,
    fail_connect: Mutex<bool>,
}

impl Default for InjectedSpeechToText {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectedSpeechToText {
    pub fn new() -> Self {
        Self {
            callbacks: CallbackRegistry::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            received: Mutex::new(Vec::new()),
            fail_connect: Mutex::new(false),
        }
    }

    /// Make the next `connect()` fail, for degraded-init scenarios.
    pub fn fail_next_connect(&self) {
        *self.fail_connect.lock() = true;
    }

    /// Fire a transcript at every subscriber, in registration order.
    pub fn emit(&self, transcript: Transcript) {
        self.callbacks.emit(&transcript);
    }

    /// Frames forwarded by the orchestrator so far.
    pub fn received_frames(&self) -> Vec<AudioFrame> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl SpeechToTextSession for InjectedSpeechToText {
    async fn connect(&self) -> Result<(), SessionError> {
        if std::mem::take(&mut *self.fail_connect.lock()) {
            return Err(SessionError::Connection("injected failure".to_string()));
        }
        *self.state.lock() = ConnectionState::Connected;
        Ok(())
    }

    async fn send_audio(&self, frame: AudioFrame) -> Result<(), SessionError> {
        if *self.state.lock() != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        self.received.lock().push(frame);
        Ok(())
    }

    fn on_transcription(&self, callback: TranscriptionCallback) -> SubscriptionId {
        self.callbacks.subscribe(callback)
    }

    fn off_transcription(&self, id: SubscriptionId) {
        self.callbacks.unsubscribe(id);
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn close(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
    }
}

/// TTS session that records utterances and emits one canned μ-law
/// frame per send, preserving send order.
pub struct CapturingTextToSpeech {
    callbacks: CallbackRegistry<AudioFrame>,
    state: Mutex<ConnectionState>,
    spoken: Mutex<Vec<(String, bool)>>,
    halt_count: AtomicU32,
    fail_connect: Mutex<bool>,
    /// Canned response payload per utterance
    frame_bytes: Vec<u8>,
}

impl CapturingTextToSpeech {
    pub fn new() -> Self {
        Self {
            callbacks: CallbackRegistry::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            spoken: Mutex::new(Vec::new()),
            halt_count: AtomicU32::new(0),
            fail_connect: Mutex::new(false),
            // One 20ms frame of μ-law silence.
            frame_bytes: vec![0xFF; 160],
        }
    }

    /// Make every `connect()` fail, for TTS-unavailable scenarios.
    pub fn fail_connect(&self) {
        *self.fail_connect.lock() = true;
    }

    /// Utterances sent so far, with their flush marks.
    pub fn spoken(&self) -> Vec<(String, bool)> {
        self.spoken.lock().clone()
    }

    pub fn halt_count(&self) -> u32 {
        self.halt_count.load(Ordering::SeqCst)
    }
}

impl Default for CapturingTextToSpeech {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextToSpeechSession for CapturingTextToSpeech {
    async fn connect(&self) -> Result<(), SessionError> {
        if *self.fail_connect.lock() {
            return Err(SessionError::Connection("injected failure".to_string()));
        }
        *self.state.lock() = ConnectionState::Connected;
        Ok(())
    }

    async fn send_text(&self, text: &str, flush: bool) -> Result<(), SessionError> {
        if !crate::segment::is_speakable(text) {
            return Ok(());
        }
        if *self.state.lock() != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        self.spoken.lock().push((text.to_string(), flush));
        self.callbacks
            .emit(&AudioFrame::mulaw_8k(self.frame_bytes.clone()));
        Ok(())
    }

    fn on_audio(&self, callback: AudioCallback) -> SubscriptionId {
        self.callbacks.subscribe(callback)
    }

    fn off_audio(&self, id: SubscriptionId) {
        self.callbacks.unsubscribe(id);
    }

    async fn halt(&self) -> Result<(), SessionError> {
        self.halt_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    async fn close(&self) {
        *self.state.lock() = ConnectionState::Disconnected;
    }
}

/// Outbound sink that records delivered frames.
#[derive(Default)]
pub struct RecordingSink {
    frames: Mutex<Vec<AudioFrame>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames.lock().clone()
    }
}

impl crate::orchestrator::OutboundAudioSink for RecordingSink {
    fn deliver(&self, frame: &AudioFrame) {
        self.frames.lock().push(frame.clone());
    }
}
