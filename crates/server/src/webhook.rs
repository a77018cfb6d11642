//! Telephony webhooks
//!
//! The voice webhook answers call setup with a TwiML document pointing
//! the provider at the media-stream WebSocket; the status webhook
//! releases call resources on terminal statuses.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use voice_gateway_transport::{is_terminal_call_status, twiml};

use crate::state::AppState;

/// Form fields of the voice webhook.
#[derive(Debug, Deserialize)]
pub struct VoiceWebhookForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: Option<String>,
    #[serde(rename = "To", default)]
    pub to: Option<String>,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
    #[serde(rename = "Direction", default)]
    pub direction: Option<String>,
    #[serde(rename = "AccountSid", default)]
    pub account_sid: Option<String>,
}

/// Form fields of the status webhook.
#[derive(Debug, Deserialize)]
pub struct StatusWebhookForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus", default)]
    pub call_status: Option<String>,
}

fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], body).into_response()
}

/// Derive the media-stream WebSocket URL from the public base URL.
fn media_stream_url(public_url: &str, call_sid: &str) -> String {
    let base = public_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/telephony/media/{call_sid}")
}

/// POST /telephony/voice
pub async fn voice_webhook(
    State(state): State<AppState>,
    Form(form): Form<VoiceWebhookForm>,
) -> Response {
    tracing::info!(
        call = %form.call_sid,
        from = form.from.as_deref().unwrap_or("unknown"),
        direction = form.direction.as_deref().unwrap_or("unknown"),
        "voice webhook"
    );

    // Carry caller identity into the media phase; the lookup itself is
    // an external concern, the gateway just relays what it was told.
    state.calls.put_handoff(
        &form.call_sid,
        serde_json::json!({
            "from": form.from,
            "to": form.to,
            "account_sid": form.account_sid,
        }),
    );

    match state.get_or_create_call(&form.call_sid).await {
        Ok(_session) => {
            let url = media_stream_url(&state.config.server.public_url, &form.call_sid);
            xml_response(twiml::connect_stream(&url))
        }
        Err(e) => {
            tracing::error!(call = %form.call_sid, error = %e, "cannot serve call");
            xml_response(twiml::say_and_hangup(&state.config.telephony.apology))
        }
    }
}

/// POST /telephony/status
pub async fn status_webhook(
    State(state): State<AppState>,
    Form(form): Form<StatusWebhookForm>,
) -> Response {
    let status = form.call_status.as_deref().unwrap_or_default();
    tracing::info!(call = %form.call_sid, status, "status webhook");

    if is_terminal_call_status(status) {
        if let Some(session) = state.calls.remove(&form.call_sid) {
            session.bridge.teardown().await;
        }
    }

    (StatusCode::OK, "OK").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_stream_url_schemes() {
        assert_eq!(
            media_stream_url("https://gw.example.com", "CA1"),
            "wss://gw.example.com/telephony/media/CA1"
        );
        assert_eq!(
            media_stream_url("http://localhost:8080/", "CA2"),
            "ws://localhost:8080/telephony/media/CA2"
        );
    }
}
