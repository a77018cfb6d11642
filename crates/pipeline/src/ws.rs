//! WebSocket client plumbing shared by provider sessions.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::SessionError;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open a provider WebSocket with extra headers, bounded by a timeout.
///
/// Provider connects must never hang indefinitely; a hung handshake
/// surfaces as `ConnectTimeout` and feeds the adapter's reconnect
/// policy like any other connection failure.
pub async fn connect_with_timeout(
    url: &str,
    headers: &[(&'static str, String)],
    timeout: Duration,
) -> Result<WsStream, SessionError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SessionError::Connection(e.to_string()))?;

    for (name, value) in headers {
        let value =
            HeaderValue::from_str(value).map_err(|e| SessionError::Connection(e.to_string()))?;
        request.headers_mut().insert(*name, value);
    }

    match tokio::time::timeout(timeout, connect_async(request)).await {
        Err(_) => Err(SessionError::ConnectTimeout(timeout.as_secs())),
        Ok(Err(err)) => Err(map_handshake_error(err)),
        Ok(Ok((stream, _response))) => Ok(stream),
    }
}

/// Credential rejections are terminal; everything else is a
/// connection-level failure the reconnect policy may retry.
fn map_handshake_error(err: WsError) -> SessionError {
    match &err {
        WsError::Http(response) if matches!(response.status().as_u16(), 401 | 403) => {
            SessionError::Auth(format!("handshake rejected with {}", response.status()))
        }
        _ => SessionError::Connection(err.to_string()),
    }
}
