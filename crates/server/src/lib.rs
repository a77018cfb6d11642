//! Voice gateway server
//!
//! HTTP and WebSocket surface: telephony webhooks, the media-stream
//! endpoint, the browser audio endpoint, health checks, and metrics.

pub mod http;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod state;
pub mod webhook;
pub mod websocket;

pub use http::create_router;
pub use metrics::init_metrics;
pub use registry::{CallRegistry, CallSession};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("call session error: {0}")]
    Call(String),

    #[error("capacity reached")]
    Capacity,

    #[error("voice session error: {0}")]
    Session(#[from] voice_gateway_pipeline::SessionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Call(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::Capacity => axum::http::StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Session(_) => axum::http::StatusCode::BAD_GATEWAY,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
