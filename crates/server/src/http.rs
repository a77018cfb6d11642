//! HTTP router

use axum::routing::{get, post};
use axum::{extract::State, response::IntoResponse, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::webhook::{status_webhook, voice_webhook};
use crate::websocket::{browser_ws, media_ws};

/// Create the application router
pub fn create_router(state: AppState, metrics: Option<PrometheusHandle>) -> Router {
    let mut router = Router::new()
        // Telephony
        .route("/telephony/voice", post(voice_webhook))
        .route("/telephony/status", post(status_webhook))
        .route("/telephony/media/:call_sid", get(media_ws))
        // Browser transport
        .route("/voice/:session_id", get(browser_ws))
        // Health
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check));

    if let Some(handle) = metrics {
        router = router.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    let mut router = router.layer(TraceLayer::new_for_http());
    if state.config.server.cors_enabled {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

/// Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "calls": state.calls.count(),
    }))
}
