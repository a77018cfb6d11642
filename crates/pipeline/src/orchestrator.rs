//! Voice session orchestrator
//!
//! Owns one conversation's lifecycle: wires STT transcripts into the
//! conversation log, routes LLM text deltas through the segmenter into
//! TTS, forwards synthesized audio to the active transport, and manages
//! barge-in when the caller starts speaking over an in-flight response.
//!
//! All per-session mutation funnels through one transcript pump task,
//! so transcripts, generation starts, and aborts for a session are
//! processed in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use voice_gateway_core::{AudioFrame, ConversationSink, StreamEvent, Transcript, Turn};
use voice_gateway_llm::{AbortHandle, GenerationBackend, GenerationStream};

use crate::observer::SubscriptionId;
use crate::segment::{SegmenterConfig, TextSegmenter};
use crate::stt::SpeechToTextSession;
use crate::tts::TextToSpeechSession;
use crate::SessionError;

/// Where normalized outbound audio goes (telephony bridge or browser
/// socket).
pub trait OutboundAudioSink: Send + Sync {
    fn deliver(&self, frame: &AudioFrame);
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// STT and TTS sessions connecting
    Initializing,
    Active,
    /// Barge-in: previous generation aborted, new one starting
    Interrupted,
    Closing,
    Closed,
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Also halt the TTS session on barge-in, instead of letting queued
    /// audio drain. Halting wins on perceived responsiveness; the
    /// request/response TTS family treats it as a no-op either way.
    pub halt_tts_on_barge_in: bool,

    /// Segmenter configuration for the delta-to-TTS path
    pub segmenter: SegmenterConfig,

    /// Pre-rendered μ-law announcement delivered straight to the
    /// transport when TTS cannot be initialized, so the caller never
    /// sits in indefinite silence.
    pub fallback_announcement: Option<Vec<u8>>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            halt_tts_on_barge_in: true,
            segmenter: SegmenterConfig::default(),
            fallback_announcement: None,
        }
    }
}

/// Per-conversation orchestrator
pub struct VoiceSessionOrchestrator {
    session_id: String,
    config: OrchestratorConfig,
    stt: Arc<dyn SpeechToTextSession>,
    tts: Arc<dyn TextToSpeechSession>,
    backend: Arc<dyn GenerationBackend>,
    conversation: Arc<dyn ConversationSink>,

    state: Mutex<SessionState>,
    /// Latest non-final transcript for the current utterance. Partials
    /// are cumulative snapshots; the final event is authoritative.
    transcript_buffer: Mutex<String>,
    current_generation: Mutex<Option<AbortHandle>>,
    output: Mutex<Option<Arc<dyn OutboundAudioSink>>>,
    transcript_tx: Mutex<Option<mpsc::Sender<Transcript>>>,
    stt_subscription: Mutex<Option<SubscriptionId>>,
    tts_subscription: Mutex<Option<SubscriptionId>>,
    stt_available: AtomicBool,
}

impl VoiceSessionOrchestrator {
    pub fn new(
        session_id: impl Into<String>,
        config: OrchestratorConfig,
        stt: Arc<dyn SpeechToTextSession>,
        tts: Arc<dyn TextToSpeechSession>,
        backend: Arc<dyn GenerationBackend>,
        conversation: Arc<dyn ConversationSink>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            config,
            stt,
            tts,
            backend,
            conversation,
            state: Mutex::new(SessionState::Idle),
            transcript_buffer: Mutex::new(String::new()),
            current_generation: Mutex::new(None),
            output: Mutex::new(None),
            transcript_tx: Mutex::new(None),
            stt_subscription: Mutex::new(None),
            tts_subscription: Mutex::new(None),
            stt_available: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn generation_in_flight(&self) -> bool {
        self.current_generation
            .lock()
            .as_ref()
            .map(|handle| !handle.is_aborted())
            .unwrap_or(false)
    }

    /// Attach the transport sink. Synthesized audio is forwarded in
    /// synthesis order; replacing the sink re-routes future frames.
    pub fn set_output(&self, sink: Arc<dyn OutboundAudioSink>) {
        if let Some(previous) = self.tts_subscription.lock().take() {
            self.tts.off_audio(previous);
        }

        let forward = Arc::clone(&sink);
        let id = self
            .tts
            .on_audio(Box::new(move |frame| forward.deliver(frame)));

        *self.tts_subscription.lock() = Some(id);
        *self.output.lock() = Some(sink);
    }

    /// Connect STT and TTS and start the transcript pump.
    ///
    /// STT failure degrades the session to output-only (voice input
    /// unavailable, other modalities keep working). TTS failure is
    /// fatal for a voice session: the fallback announcement is pushed
    /// to the transport and the error surfaced so the caller side can
    /// hang up.
    pub async fn init(self: &Arc<Self>) -> Result<(), SessionError> {
        *self.state.lock() = SessionState::Initializing;

        let (tx, mut rx) = mpsc::channel::<Transcript>(64);
        *self.transcript_tx.lock() = Some(tx.clone());

        let pump_tx = tx;
        let id = self.stt.on_transcription(Box::new(move |transcript| {
            if pump_tx.try_send(transcript.clone()).is_err() {
                tracing::warn!("transcript pump full, dropping event");
            }
        }));
        *self.stt_subscription.lock() = Some(id);

        let pump = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(transcript) = rx.recv().await {
                pump.handle_transcript(transcript).await;
            }
        });

        match self.stt.connect().await {
            Ok(()) => self.stt_available.store(true, Ordering::SeqCst),
            Err(e) => {
                tracing::warn!(
                    session = %self.session_id,
                    error = %e,
                    "STT unavailable, voice input disabled for this session"
                );
            }
        }

        if let Err(e) = self.tts.connect().await {
            tracing::error!(session = %self.session_id, error = %e, "TTS init failed");
            self.deliver_fallback_announcement();
            *self.state.lock() = SessionState::Closed;
            return Err(e);
        }

        *self.state.lock() = SessionState::Active;
        Ok(())
    }

    /// Inbound audio from the transport, already decoded to the frame
    /// the STT session expects. Audio-path errors are swallowed here:
    /// a dropped chunk degrades the transcript, ending the call would
    /// be worse.
    pub async fn handle_inbound_audio(&self, frame: AudioFrame) {
        if !self.stt_available.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.stt.send_audio(frame).await {
            tracing::warn!(session = %self.session_id, error = %e, "dropping inbound audio chunk");
        }
    }

    /// Speak one utterance outside the LLM flow (the greeting).
    pub async fn speak(&self, text: &str) -> Result<(), SessionError> {
        self.tts.connect().await?;
        self.tts.send_text(text, true).await
    }

    async fn handle_transcript(self: &Arc<Self>, transcript: Transcript) {
        if !transcript.is_final {
            *self.transcript_buffer.lock() = transcript.text;
            return;
        }

        let buffered = std::mem::take(&mut *self.transcript_buffer.lock());
        let utterance = if transcript.text.trim().is_empty() {
            buffered
        } else {
            transcript.text
        };

        if utterance.trim().is_empty() {
            return;
        }

        self.start_generation(utterance.trim().to_string()).await;
    }

    /// Commit the utterance and start a generation for it, aborting any
    /// generation still in flight (last-writer-wins, no queueing).
    async fn start_generation(self: &Arc<Self>, utterance: String) {
        let previous = self.current_generation.lock().take();
        if let Some(handle) = previous {
            if !handle.is_aborted() {
                *self.state.lock() = SessionState::Interrupted;
                handle.abort();
                tracing::debug!(session = %self.session_id, "barge-in: aborted in-flight generation");

                if self.config.halt_tts_on_barge_in {
                    if let Err(e) = self.tts.halt().await {
                        tracing::warn!(error = %e, "TTS halt failed during barge-in");
                    }
                }
            }
        }

        self.conversation.commit(Turn::user(&utterance));

        let stream = match self
            .backend
            .generate(&utterance, &self.conversation.history())
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(session = %self.session_id, error = %e, "generation failed to start");
                *self.state.lock() = SessionState::Active;
                return;
            }
        };

        let handle = stream.abort_handle();
        *self.current_generation.lock() = Some(handle.clone());
        *self.state.lock() = SessionState::Active;

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_generation(stream, handle).await;
        });
    }

    /// Consume one generation: deltas through the segmenter, flushes to
    /// TTS in emission order, remainder flushed on finish.
    async fn run_generation(self: Arc<Self>, mut stream: GenerationStream, handle: AbortHandle) {
        let mut segmenter = TextSegmenter::new(self.config.segmenter.clone());
        let mut reply = String::new();

        while let Some(event) = stream.next_event().await {
            if handle.is_aborted() {
                break;
            }

            match event {
                StreamEvent::TextDelta(delta) => {
                    reply.push_str(&delta);
                    let decision = segmenter.push_delta(&delta);
                    if decision.should_flush {
                        self.dispatch_tts(&decision.text_to_send).await;
                    }
                }
                StreamEvent::Finish => {
                    if let Some(remainder) = segmenter.finish() {
                        self.dispatch_tts(&remainder).await;
                    }
                    if !reply.trim().is_empty() {
                        self.conversation.commit(Turn::assistant(reply.trim()));
                    }
                    break;
                }
                StreamEvent::ToolCall { name, .. } => {
                    // Tool execution lives outside the gateway; the
                    // result comes back through the same stream.
                    tracing::debug!(tool = %name, "tool call passed through");
                }
                StreamEvent::ToolResult { name, .. } => {
                    tracing::debug!(tool = %name, "tool result passed through");
                }
            }
        }

        let mut current = self.current_generation.lock();
        if current
            .as_ref()
            .map(|active| active.same_as(&handle))
            .unwrap_or(false)
        {
            *current = None;
        }
    }

    /// Hand one flushable unit to TTS. A failed text send is surfaced
    /// by the adapter; the policy here is to abandon that utterance and
    /// keep the session alive.
    async fn dispatch_tts(&self, text: &str) {
        if let Err(e) = self.tts.connect().await {
            tracing::error!(session = %self.session_id, error = %e, "TTS reconnect failed, dropping utterance");
            return;
        }
        if let Err(e) = self.tts.send_text(text, true).await {
            tracing::error!(session = %self.session_id, error = %e, "TTS send failed, dropping utterance");
        }
    }

    fn deliver_fallback_announcement(&self) {
        let Some(bytes) = self.config.fallback_announcement.clone() else {
            return;
        };
        if let Some(sink) = self.output.lock().clone() {
            sink.deliver(&AudioFrame::mulaw_8k(bytes));
        }
    }

    /// Tear the session down: abort any generation, release both
    /// provider sessions, detach subscriptions. Safe to call twice.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closing;
        }

        if let Some(handle) = self.current_generation.lock().take() {
            handle.abort();
        }

        if let Some(id) = self.stt_subscription.lock().take() {
            self.stt.off_transcription(id);
        }
        if let Some(id) = self.tts_subscription.lock().take() {
            self.tts.off_audio(id);
        }
        self.transcript_tx.lock().take();

        self.stt.close().await;
        self.tts.close().await;

        *self.state.lock() = SessionState::Closed;
        tracing::info!(session = %self.session_id, "voice session closed");
    }
}
