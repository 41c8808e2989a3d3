//! Client-side WebSocket socket plumbing.
//!
//! Wraps `tokio-tungstenite` connect and close mechanics. The handshake
//! itself (TCP, HTTP upgrade, frame encoding) is entirely tungstenite's
//! business; this module only builds the client request, applies the
//! caller's decorator, and opens the stream.

// ============================================================================
// Imports
// ============================================================================

use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Message, handshake};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// The WebSocket stream type used by the engine.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a split [`WsStream`].
pub(crate) type WsSink = SplitSink<WsStream, Message>;

/// The HTTP upgrade request sent during the WebSocket handshake.
///
/// Passed to the [`Connector`] decorator so callers can attach headers
/// (authentication tokens, cookies) before the connection is opened.
pub type ClientRequest = handshake::client::Request;

/// Connection decorator hook.
///
/// Invoked on every connect attempt with the freshly built handshake
/// request. Returning an error aborts the attempt.
pub type Connector = Box<dyn Fn(ClientRequest) -> Result<ClientRequest> + Send + Sync>;

// ============================================================================
// Functions
// ============================================================================

/// Builds the handshake request for a URL and runs it through the decorator.
///
/// This is the synchronous part of connecting: a failure here means the
/// connection object cannot even be constructed and is not retried.
///
/// # Errors
///
/// Returns [`Error::WebSocket`](crate::Error::WebSocket) for an invalid URL,
/// or whatever the decorator returns.
pub(crate) fn build_request(url: &str, connector: Option<&Connector>) -> Result<ClientRequest> {
    let request = url.into_client_request()?;
    match connector {
        Some(decorate) => decorate(request),
        None => Ok(request),
    }
}

/// Opens a WebSocket connection for a prepared handshake request.
///
/// # Errors
///
/// Returns [`Error::WebSocket`](crate::Error::WebSocket) if the handshake
/// fails.
pub(crate) async fn open(request: ClientRequest) -> Result<WsStream> {
    let (stream, response) = connect_async(request).await?;
    debug!(status = %response.status(), "WebSocket handshake completed");
    Ok(stream)
}

/// Closes the write half with a reason, ignoring delivery failures.
///
/// The peer may already be gone when we close; there is nothing useful to
/// do with the error either way.
pub(crate) async fn close(ws_write: &mut WsSink, reason: &'static str) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: Utf8Bytes::from_static(reason),
    };

    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        debug!(error = %e, reason, "Close frame not delivered");
    }
    let _ = ws_write.close().await;
}

// ============================================================================
// Tests
// ============================================================================
