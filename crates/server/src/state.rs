//! Application state
//!
//! All dependencies are constructed here and injected explicitly; no
//! module-level service handles anywhere in the tree.

use std::sync::Arc;
use std::time::Duration;

use voice_gateway_config::{Settings, TtsOutput};
use voice_gateway_core::InMemoryConversationLog;
use voice_gateway_llm::GenerationBackend;
use voice_gateway_pipeline::{
    OrchestratorConfig, SegmenterConfig, VoiceSessionOrchestrator,
};
use voice_gateway_transport::TelephonyBridge;

use crate::providers;
use crate::registry::{CallRegistry, CallSession};
use crate::ServerError;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub calls: Arc<CallRegistry>,
    pub backend: Arc<dyn GenerationBackend>,
}

impl AppState {
    pub fn new(config: Settings, backend: Arc<dyn GenerationBackend>) -> Self {
        let calls = Arc::new(CallRegistry::new(
            config.server.max_calls,
            Duration::from_secs(config.server.call_timeout_secs),
        ));
        Self {
            config: Arc::new(config),
            calls,
            backend,
        }
    }

    fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            segmenter: SegmenterConfig {
                fragment_flush: self.config.segmenter.fragment_flush,
                ..SegmenterConfig::default()
            },
            ..OrchestratorConfig::default()
        }
    }

    /// Get the session for a call, creating it when this instance has
    /// not seen the call yet. Webhook and media phases may land in
    /// either order; both funnel through here.
    pub async fn get_or_create_call(&self, call_sid: &str) -> Result<Arc<CallSession>, ServerError> {
        if let Some(session) = self.calls.get(call_sid) {
            session.touch();
            return Ok(session);
        }

        // Webhook-phase caller info, when this instance saw the webhook.
        if let Some(handoff) = self.calls.take_handoff(call_sid) {
            tracing::debug!(call = %call_sid, caller = %handoff, "caller handoff found");
        }

        let stt = providers::build_stt(&self.config, providers::SttInput::MulawTelephony);
        let tts = providers::build_tts(&self.config, TtsOutput::Mulaw8k);

        let orchestrator = Arc::new(VoiceSessionOrchestrator::new(
            call_sid,
            self.orchestrator_config(),
            stt,
            tts,
            Arc::clone(&self.backend),
            Arc::new(InMemoryConversationLog::new()),
        ));

        let bridge = Arc::new(TelephonyBridge::new(
            call_sid,
            self.config.telephony.greeting.clone(),
            Arc::clone(&orchestrator),
        ));
        orchestrator.set_output(bridge.clone());

        // A voice call without TTS is unserveable; surface the failure
        // so the webhook answers with the apology document.
        orchestrator.init().await?;

        let session = Arc::new(CallSession::new(
            call_sid,
            orchestrator,
            bridge,
        ));
        self.calls.insert(Arc::clone(&session))?;
        metrics::counter!("voice_gateway_calls_total").increment(1);

        Ok(session)
    }

    /// Build a browser voice session. These are per-connection and not
    /// registered: the socket's lifetime is the session's lifetime.
    pub fn build_browser_orchestrator(
        &self,
        session_id: &str,
    ) -> Arc<VoiceSessionOrchestrator> {
        let stt = providers::build_stt(&self.config, providers::SttInput::LinearBrowser);
        let tts = providers::build_tts(&self.config, TtsOutput::Native);

        Arc::new(VoiceSessionOrchestrator::new(
            session_id,
            self.orchestrator_config(),
            stt,
            tts,
            Arc::clone(&self.backend),
            Arc::new(InMemoryConversationLog::new()),
        ))
    }
}
