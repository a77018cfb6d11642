//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Speech-to-text provider configuration
    #[serde(default)]
    pub stt: SttSettings,

    /// Text-to-speech provider configuration
    #[serde(default)]
    pub tts: TtsSettings,

    /// Text segmentation configuration
    #[serde(default)]
    pub segmenter: SegmenterSettings,

    /// Telephony configuration
    #[serde(default)]
    pub telephony: TelephonySettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from defaults, an optional TOML file, and
    /// `VOICE_GATEWAY__*` environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(Environment::with_prefix("VOICE_GATEWAY").separator("__"))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "port must be nonzero".to_string(),
            });
        }

        if self.tts.keepalive_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tts.keepalive_interval_secs".to_string(),
                message: "keep-alive interval must be nonzero".to_string(),
            });
        }

        if self.stt.backoff_base_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "stt.backoff_base_ms".to_string(),
                message: "backoff base must be nonzero".to_string(),
            });
        }

        // Missing credentials are a warning, not an error: tests and the
        // scripted loop run without any provider account.
        if self.stt.api_key.is_empty() {
            tracing::warn!("stt.api_key is empty; live transcription will fail to authenticate");
        }
        if self.tts.api_key.is_empty() {
            tracing::warn!("tts.api_key is empty; live synthesis will fail to authenticate");
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used to build the media stream
    /// WebSocket URL handed to the telephony provider
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Maximum concurrent calls
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,

    /// Idle call expiry in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// Enable CORS (browser transport)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            max_calls: default_max_calls(),
            call_timeout_secs: default_call_timeout(),
            cors_enabled: true,
        }
    }
}

/// Which STT provider family to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProviderKind {
    Deepgram,
    AssemblyAi,
}

/// Speech-to-text settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttSettings {
    /// Provider family
    #[serde(default = "default_stt_provider")]
    pub provider: SttProviderKind,

    /// Provider API key
    #[serde(default)]
    pub api_key: String,

    /// Provider model name
    #[serde(default = "default_stt_model")]
    pub model: String,

    /// Language hint
    #[serde(default = "default_language")]
    pub language: String,

    /// Reconnect automatically on unexpected close
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Fixed reconnect delay in ms (Deepgram-family policy)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Exponential backoff base in ms (AssemblyAI-family policy)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum reconnect attempts before surfacing a terminal failure
    /// (AssemblyAI-family policy)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Re-mint ephemeral tokens this close to expiry, in seconds
    #[serde(default = "default_token_expiry_margin")]
    pub token_expiry_margin_secs: u64,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            provider: default_stt_provider(),
            api_key: String::new(),
            model: default_stt_model(),
            language: default_language(),
            auto_reconnect: true,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            connect_timeout_secs: default_connect_timeout(),
            token_expiry_margin_secs: default_token_expiry_margin(),
        }
    }
}

/// Which TTS provider family to construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsProviderKind {
    ElevenLabs,
    Google,
}

/// Output format the TTS adapter normalizes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TtsOutput {
    /// 8kHz μ-law for the telephony transport
    Mulaw8k,
    /// Provider-native bytes for browser-side decode
    Native,
}

/// Text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsSettings {
    /// Provider family
    #[serde(default = "default_tts_provider")]
    pub provider: TtsProviderKind,

    /// Provider API key
    #[serde(default)]
    pub api_key: String,

    /// Voice identifier (ElevenLabs voice id / Google voice name)
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Provider model name, where applicable
    #[serde(default = "default_tts_model")]
    pub model: String,

    /// Language code for request/response providers
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Output normalization target
    #[serde(default = "default_tts_output")]
    pub output: TtsOutput,

    /// Idle keep-alive interval for streaming sessions, in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for TtsSettings {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            api_key: String::new(),
            voice: default_voice(),
            model: default_tts_model(),
            language_code: default_language_code(),
            output: default_tts_output(),
            keepalive_interval_secs: default_keepalive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Text segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterSettings {
    /// Flush at fragment boundaries too, not only full sentences.
    /// Lower latency, choppier speech.
    #[serde(default)]
    pub fragment_flush: bool,
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            fragment_flush: false,
        }
    }
}

/// Telephony settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelephonySettings {
    /// Greeting spoken exactly once when a call connects
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Apology spoken when the gateway cannot serve the call
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for TelephonySettings {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            apology: default_apology(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Expose Prometheus metrics at /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            metrics_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_calls() -> usize {
    100
}

fn default_call_timeout() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_stt_provider() -> SttProviderKind {
    SttProviderKind::Deepgram
}

fn default_stt_model() -> String {
    "nova-2".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_token_expiry_margin() -> u64 {
    30
}

fn default_tts_provider() -> TtsProviderKind {
    TtsProviderKind::ElevenLabs
}

fn default_voice() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_tts_model() -> String {
    "eleven_turbo_v2".to_string()
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_tts_output() -> TtsOutput {
    TtsOutput::Mulaw8k
}

fn default_keepalive() -> u64 {
    15
}

fn default_greeting() -> String {
    "Hello! How can I help you today?".to_string()
}

fn default_apology() -> String {
    "We are sorry, an application error has occurred. Goodbye.".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.stt.provider, SttProviderKind::Deepgram);
        assert_eq!(settings.tts.output, TtsOutput::Mulaw8k);
        assert_eq!(settings.tts.keepalive_interval_secs, 15);
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_zero_backoff_rejected() {
        let mut settings = Settings::default();
        settings.stt.backoff_base_ms = 0;
        assert!(settings.validate().is_err());
    }
}
