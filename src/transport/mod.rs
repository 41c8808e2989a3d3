//! WebSocket transport layer.
//!
//! Thin wrapper around `tokio-tungstenite` used by the connection engine.
//! The physical handshake (TCP, TLS, HTTP upgrade) is delegated entirely to
//! tungstenite; this layer contributes the handshake-request builder, the
//! caller's [`Connector`] decorator, and close-with-reason semantics.
//!
//! # Connection Lifecycle
//!
//! 1. Build the HTTP upgrade request (synchronous, failures are fatal and
//!    never surfaced as retries)
//! 2. [`Connector`] - Decorate the request (headers, auth)
//! 3. Perform the WebSocket handshake
//! 4. Engine owns the stream until close or drop
//! 5. Close with a reason (`"Reconnecting"` / `"Disconnecting"`)

// ============================================================================
// Submodules
// ============================================================================

/// Client-side socket plumbing.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use socket::{ClientRequest, Connector, WsStream};

/// HTTP types for building [`Connector`] decorators.
///
/// Re-exported from tungstenite so callers can construct header values
/// without a direct `http` dependency.
pub use tokio_tungstenite::tungstenite::http;
