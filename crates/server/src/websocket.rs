//! WebSocket endpoints
//!
//! The telephony media stream speaks framed JSON; the browser endpoint
//! takes raw binary mic audio in and `audio-chunk` JSON out. Both feed
//! the same orchestrator type.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voice_gateway_core::AudioFrame;
use voice_gateway_pipeline::OutboundAudioSink;
use voice_gateway_transport::{browser, FrameDisposition};

use crate::state::AppState;

/// GET /telephony/media/:call_sid (WebSocket upgrade)
pub async fn media_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_media_socket(socket, state, call_sid))
}

async fn handle_media_socket(socket: WebSocket, state: AppState, call_sid: String) {
    let session = match state.get_or_create_call(&call_sid).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(call = %call_sid, error = %e, "rejecting media stream");
            return;
        }
    };

    let (mut sender, mut receiver) = socket.split();

    // Outbound frames flow through the bridge's fan-out queue.
    let (tx, mut rx) = mpsc::channel::<String>(256);
    session.bridge.register_connection(tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                session.touch();
                metrics::counter!("voice_gateway_media_frames_total").increment(1);
                if session.bridge.handle_frame(&text).await == FrameDisposition::Stop {
                    state.calls.remove(&call_sid);
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(call = %call_sid, error = %e, "media socket error");
                break;
            }
        }
    }

    writer.abort();
    tracing::info!(call = %call_sid, "media stream connection closed");
}

/// Sink forwarding synthesized audio to one browser connection.
struct BrowserSink {
    tx: mpsc::Sender<String>,
}

impl OutboundAudioSink for BrowserSink {
    fn deliver(&self, frame: &AudioFrame) {
        let message = browser::audio_chunk_message(frame);
        if self.tx.try_send(message).is_err() {
            tracing::warn!("browser outbound queue full or closed, dropping chunk");
        }
    }
}

/// GET /voice/:session_id (WebSocket upgrade)
pub async fn browser_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| handle_browser_socket(socket, state, session_id))
}

async fn handle_browser_socket(socket: WebSocket, state: AppState, session_id: String) {
    let orchestrator = state.build_browser_orchestrator(&session_id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(256);
    orchestrator.set_output(Arc::new(BrowserSink { tx }));

    if let Err(e) = orchestrator.init().await {
        tracing::error!(session = %session_id, error = %e, "browser session init failed");
        return;
    }
    tracing::info!(session = %session_id, "browser voice session started");

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sender.send(Message::Text(message)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            // Mic audio arrives as raw binary frames: 16-bit little-
            // endian PCM at 16kHz from the browser recorder.
            Ok(Message::Binary(bytes)) => {
                metrics::counter!("voice_gateway_browser_frames_total").increment(1);
                orchestrator
                    .handle_inbound_audio(AudioFrame::pcm16_16k(bytes))
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "browser socket error");
                break;
            }
        }
    }

    orchestrator.close().await;
    writer.abort();
    tracing::info!(session = %session_id, "browser voice session closed");
}
