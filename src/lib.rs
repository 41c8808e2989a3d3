//! Typed bidirectional request/response protocol over WebSocket.
//!
//! This library layers a correlated request/response protocol on top of a
//! persistent WebSocket connection. Either endpoint can send a typed
//! request fire-and-forget or await a correlated typed response, while the
//! same connection carries unsolicited requests that are routed to
//! registered handlers.
//!
//! # Architecture
//!
//! - A single engine task owns the physical connection and replaces it
//!   wholesale on reconnect; all sends funnel through it
//! - Correlated requests are tracked in a correlation table keyed by a
//!   random 128-bit id and resolved exactly once
//! - Connect failures back off 5s per consecutive failure capped at 60s;
//!   an unsolicited drop retries once after 1s, gated by a policy hook
//!
//! # Wire Format
//!
//! One JSON envelope per text frame:
//!
//! | Shape | Fields |
//! |-------|--------|
//! | Fire-and-forget request | `{type, data}` |
//! | Correlated request | `{type, ref, data}` |
//! | Success response | `{type: "RESPONSE", ref, data}` |
//! | Failure response | `{type: "RESPONSE", ref, success: false, error, errno}` |
//!
//! # Quick Start
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use websocket_request::{Client, RequestType, Result};
//!
//! #[derive(Serialize, Deserialize)]
//! struct GetTime;
//!
//! impl RequestType for GetTime {
//!     const TYPE: &'static str = "time.get";
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct Time {
//!     epoch_ms: u64,
//! }
//!
//! impl RequestType for Time {
//!     const TYPE: &'static str = "time";
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::new("ws://127.0.0.1:9000");
//!     client.connect()?;
//!
//!     let pending = client
//!         .send_request_with_response::<GetTime, Time>(&GetTime)
//!         .await?;
//!     let time = pending.recv().await?;
//!     println!("server time: {}", time.epoch_ms);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], builder, and pending-response handles |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handler`] | [`RequestHandler`] trait and registry |
//! | [`identifiers`] | Correlation id wrapper |
//! | [`protocol`] | Wire envelope and [`RequestType`] contract |
//! | [`transport`] | WebSocket socket plumbing (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Request client and connection engine.
///
/// Use [`Client::builder()`] to configure hooks, or [`Client::new()`] for
/// defaults.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Inbound request handlers and registry.
pub mod handler;

/// Type-safe correlation identifier.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module wrapping tokio-tungstenite; exposed for the
/// [`ClientRequest`] decorator types.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, pending::PendingResponse};

// Error types
pub use error::{Error, Result};

// Handler types
pub use handler::RequestHandler;

// Identifier types
pub use identifiers::RequestRef;

// Protocol types
pub use protocol::{Envelope, RESPONSE_TYPE, RequestType};

// Transport types
pub use transport::{ClientRequest, Connector};
