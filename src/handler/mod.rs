//! Inbound request handlers and registry.
//!
//! A handler processes unsolicited requests arriving from the peer for one
//! request type. The registry owns the decode step: each entry deserializes
//! the payload into its own request type before invoking the handler, so
//! the router never touches an untyped value.
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//! use serde_json::{Value, json};
//! use websocket_request::{RequestHandler, RequestType, Result};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u64,
//! }
//!
//! impl RequestType for Ping {
//!     const TYPE: &'static str = "ping";
//! }
//!
//! struct PingHandler;
//!
//! #[async_trait]
//! impl RequestHandler for PingHandler {
//!     type Request = Ping;
//!
//!     async fn on_request_with_response(&self, request: Ping) -> Result<Value> {
//!         Ok(json!({"seq": request.seq}))
//!     }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::Result;
use crate::protocol::RequestType;

// ============================================================================
// RequestHandler
// ============================================================================

/// Processes inbound requests of one type.
///
/// Both operations have defaults: `on_request` ignores the request, and
/// `on_request_with_response` delegates to `on_request` and replies with a
/// null payload. Override whichever the peer actually invokes.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// The request type this handler accepts.
    type Request: RequestType;

    /// Called for a fire-and-forget request (no `ref` on the envelope).
    ///
    /// # Errors
    ///
    /// Any error is routed to the client's handler-exception hook; it never
    /// reaches the peer.
    async fn on_request(&self, request: Self::Request) -> Result<()> {
        let _ = request;
        Ok(())
    }

    /// Called for a correlated request; the returned payload is wrapped in
    /// a `RESPONSE` envelope and sent back with the request's `ref`.
    ///
    /// # Errors
    ///
    /// Any error is routed to the handler-exception hook and no response
    /// frame is sent for the failed invocation.
    async fn on_request_with_response(&self, request: Self::Request) -> Result<Value> {
        self.on_request(request).await?;
        Ok(Value::Null)
    }
}

// ============================================================================
// ErasedHandler
// ============================================================================

/// Object-safe dispatch wrapper over a typed [`RequestHandler`].
///
/// Decoding happens here, typed to the handler's own request type.
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    /// Decodes the payload and invokes the fire-and-forget operation.
    async fn dispatch(&self, data: Value) -> Result<()>;

    /// Decodes the payload and invokes the response-producing operation.
    async fn dispatch_with_response(&self, data: Value) -> Result<Value>;
}

struct TypedHandler<H>(H);

#[async_trait]
impl<H: RequestHandler> ErasedHandler for TypedHandler<H> {
    async fn dispatch(&self, data: Value) -> Result<()> {
        let request = H::Request::decode(data)?;
        self.0.on_request(request).await
    }

    async fn dispatch_with_response(&self, data: Value) -> Result<Value> {
        let request = H::Request::decode(data)?;
        self.0.on_request_with_response(request).await
    }
}

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Mapping from request-type tag to registered handler.
///
/// Owned by each client instance; never a process-wide singleton, so
/// multiple independent connections can coexist. Last registration for a
/// tag wins.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: FxHashMap<String, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    /// Registers a handler under its request type's tag.
    pub(crate) fn insert<H: RequestHandler>(&mut self, handler: H) {
        self.handlers
            .insert(H::Request::TYPE.to_string(), Arc::new(TypedHandler(handler)));
    }

    /// Looks up the handler for a type tag.
    pub(crate) fn get(&self, type_tag: &str) -> Option<Arc<dyn ErasedHandler>> {
        self.handlers.get(type_tag).cloned()
    }

    /// Returns the number of registered handlers.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
