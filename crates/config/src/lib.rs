//! Configuration for the voice gateway
//!
//! Layered settings: built-in defaults, then an optional TOML file, then
//! `VOICE_GATEWAY__*` environment overrides (double underscore as the
//! nesting separator, e.g. `VOICE_GATEWAY__SERVER__PORT=8080`).

mod settings;

pub use settings::{
    ObservabilityConfig, SegmenterSettings, ServerConfig, Settings, SttProviderKind, SttSettings,
    TelephonySettings, TtsOutput, TtsProviderKind, TtsSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
