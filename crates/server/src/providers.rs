//! Provider session construction from settings
//!
//! Provider variants are selected at construction time from
//! configuration; the orchestrator only ever sees the session traits.

use std::sync::Arc;
use std::time::Duration;

use voice_gateway_config::{Settings, SttProviderKind, TtsOutput, TtsProviderKind};
use voice_gateway_pipeline::stt::{
    AssemblyAiConfig, AssemblyAiSession, DeepgramConfig, DeepgramSession,
};
use voice_gateway_pipeline::tts::{
    ElevenLabsConfig, ElevenLabsSession, GoogleTtsConfig, GoogleTtsSession,
};
use voice_gateway_pipeline::{SpeechToTextSession, TextToSpeechSession, TtsOutputFormat};

/// What the transport feeds the STT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttInput {
    /// Telephony media stream: μ-law at 8kHz
    MulawTelephony,
    /// Browser recorder: linear PCM16 at 16kHz
    LinearBrowser,
}

impl SttInput {
    fn sample_rate(&self) -> u32 {
        match self {
            SttInput::MulawTelephony => 8000,
            SttInput::LinearBrowser => 16000,
        }
    }

    fn encoding(&self) -> &'static str {
        match self {
            SttInput::MulawTelephony => "mulaw",
            SttInput::LinearBrowser => "linear16",
        }
    }
}

/// Build the configured speech-to-text session for a transport.
pub fn build_stt(settings: &Settings, input: SttInput) -> Arc<dyn SpeechToTextSession> {
    let stt = &settings.stt;
    match stt.provider {
        SttProviderKind::Deepgram => Arc::new(DeepgramSession::new(DeepgramConfig {
            api_key: stt.api_key.clone(),
            model: stt.model.clone(),
            language: stt.language.clone(),
            sample_rate: input.sample_rate(),
            encoding: input.encoding().to_string(),
            auto_reconnect: stt.auto_reconnect,
            reconnect_delay: Duration::from_millis(stt.reconnect_delay_ms),
            connect_timeout: Duration::from_secs(stt.connect_timeout_secs),
            ..DeepgramConfig::default()
        })),
        SttProviderKind::AssemblyAi => Arc::new(AssemblyAiSession::new(AssemblyAiConfig {
            api_key: stt.api_key.clone(),
            sample_rate: input.sample_rate(),
            auto_reconnect: stt.auto_reconnect,
            backoff_base: Duration::from_millis(stt.backoff_base_ms),
            max_reconnect_attempts: stt.max_reconnect_attempts,
            connect_timeout: Duration::from_secs(stt.connect_timeout_secs),
            token_expiry_margin: Duration::from_secs(stt.token_expiry_margin_secs),
            ..AssemblyAiConfig::default()
        })),
    }
}

/// Build the configured text-to-speech session, normalized for the
/// given transport.
pub fn build_tts(settings: &Settings, output: TtsOutput) -> Arc<dyn TextToSpeechSession> {
    let tts = &settings.tts;
    let format = match output {
        TtsOutput::Mulaw8k => TtsOutputFormat::Mulaw8k,
        TtsOutput::Native => TtsOutputFormat::Native,
    };

    match tts.provider {
        TtsProviderKind::ElevenLabs => Arc::new(ElevenLabsSession::new(ElevenLabsConfig {
            api_key: tts.api_key.clone(),
            voice_id: tts.voice.clone(),
            model: tts.model.clone(),
            output: format,
            keepalive_interval: Duration::from_secs(tts.keepalive_interval_secs),
            connect_timeout: Duration::from_secs(tts.connect_timeout_secs),
            ..ElevenLabsConfig::default()
        })),
        TtsProviderKind::Google => Arc::new(GoogleTtsSession::new(GoogleTtsConfig {
            api_key: tts.api_key.clone(),
            voice_name: tts.voice.clone(),
            language_code: tts.language_code.clone(),
            output: format,
            ..GoogleTtsConfig::default()
        })),
    }
}
