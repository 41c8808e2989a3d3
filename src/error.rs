//! Error types for the WebSocket request client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use websocket_request::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let pending = client.send_request_with_response::<Ping, Pong>(&Ping).await?;
//!     let pong = pending.recv().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Connection | [`Error::Connection`], [`Error::NotConnected`], [`Error::ConnectionClosed`], [`Error::ConnectionReset`] |
//! | Application | [`Error::Response`], [`Error::Handler`] |
//! | External | [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Failed to construct or establish the WebSocket connection.
    ///
    /// Returned synchronously from `connect()` when the connection object
    /// cannot even be built (bad URL, decorator failure). Not retried.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Operation attempted while no connection is open.
    ///
    /// Returned when sending a request before `connect()` completes or
    /// while the engine is between reconnect attempts.
    #[error("Not connected")]
    NotConnected,

    /// The connection engine has shut down.
    ///
    /// Returned when the client was explicitly disconnected or dropped
    /// while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A reconnect was initiated while this request was outstanding.
    ///
    /// Pending requests cannot be answered by a future physical connection,
    /// so they are failed the moment a new connection attempt starts.
    #[error("Connection reset")]
    ConnectionReset,

    // ========================================================================
    // Application Errors
    // ========================================================================
    /// The server answered a correlated request with `success: false`.
    ///
    /// Carries the server-supplied error message and numeric code verbatim.
    /// Distinct from transport-level failure: the connection is healthy,
    /// the remote application rejected the request.
    #[error("Request failed: {message} (errno {errno})")]
    Response {
        /// Server-supplied error message.
        message: String,
        /// Server-supplied numeric error code.
        errno: i64,
    },

    /// A registered handler failed while processing an inbound request.
    ///
    /// Routed to the handler-exception hook, never propagated to the
    /// transport callback.
    #[error("Handler error: {message}")]
    Handler {
        /// Description of the handler failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a server-reported response failure.
    #[inline]
    pub fn response(message: impl Into<String>, errno: i64) -> Self {
        Self::Response {
            message: message.into(),
            errno,
        }
    }

    /// Creates a handler error.
    #[inline]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::NotConnected
                | Self::ConnectionClosed
                | Self::ConnectionReset
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a server-reported application failure.
    #[inline]
    #[must_use]
    pub fn is_response_error(&self) -> bool {
        matches!(self, Self::Response { .. })
    }

    /// Returns the server-supplied error code, if any.
    #[inline]
    #[must_use]
    pub fn errno(&self) -> Option<i64> {
        match self {
            Self::Response { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_response_error_display() {
        let err = Error::response("missing field", 42);
        assert_eq!(err.to_string(), "Request failed: missing field (errno 42)");
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let closed_err = Error::ConnectionClosed;
        let reset_err = Error::ConnectionReset;
        let other_err = Error::response("test", 1);

        assert!(conn_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(reset_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_response_error() {
        let resp_err = Error::response("denied", 7);
        let conn_err = Error::NotConnected;

        assert!(resp_err.is_response_error());
        assert!(!conn_err.is_response_error());
    }

    #[test]
    fn test_errno() {
        let resp_err = Error::response("denied", 7);
        let other_err = Error::ConnectionClosed;

        assert_eq!(resp_err.errno(), Some(7));
        assert_eq!(other_err.errno(), None);
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
