//! Pending request correlation.
//!
//! Each correlated request registers a [`PendingRequest`] in the correlation
//! map keyed by its [`RequestRef`]. The engine resolves the entry exactly
//! once when a matching `RESPONSE` envelope arrives, or fails it when the
//! connection is reset. The caller holds the other end as a
//! [`PendingResponse`], a non-blocking handle that decodes the payload with
//! the *response* type's decoder only when awaited.

// ============================================================================
// Imports
// ============================================================================

use std::marker::PhantomData;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::RequestRef;
use crate::protocol::RequestType;

// ============================================================================
// Types
// ============================================================================

/// Map of correlation ids to pending request slots.
pub(crate) type CorrelationMap = FxHashMap<RequestRef, PendingRequest>;

// ============================================================================
// PendingRequest
// ============================================================================

/// Engine-side slot for one outstanding correlated request.
///
/// The oneshot sender makes resolution single-assignment by construction:
/// resolving consumes the slot, and a resolve after the caller dropped its
/// handle is a no-op.
pub(crate) struct PendingRequest {
    tx: oneshot::Sender<Result<Value>>,
}

impl PendingRequest {
    /// Creates a pending entry and the receiver for its caller handle.
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Resolves the slot with a decoded payload or a typed failure.
    pub(crate) fn resolve(self, result: Result<Value>) {
        let _ = self.tx.send(result);
    }
}

/// Fails every outstanding pending request with the supplied error.
///
/// Called when the physical connection is replaced or torn down: a matching
/// response can never arrive on a different connection, so leaving entries
/// behind would leak them forever.
pub(crate) fn fail_all(correlation: &Mutex<CorrelationMap>, make_error: fn() -> Error) {
    let drained: Vec<(RequestRef, PendingRequest)> = correlation.lock().drain().collect();
    let count = drained.len();

    for (_, pending) in drained {
        pending.resolve(Err(make_error()));
    }

    if count > 0 {
        debug!(count, "Failed outstanding pending requests");
    }
}

// ============================================================================
// PendingResponse
// ============================================================================

/// Caller-side handle for an outstanding correlated request.
///
/// Returned immediately after the request envelope is transmitted; the
/// caller suspends only when it explicitly awaits [`recv`](Self::recv).
///
/// There is no built-in timeout: if the server never replies and the
/// connection never drops, `recv` waits indefinitely. Wrap it in
/// `tokio::time::timeout` if a bound is needed.
#[must_use = "a pending response does nothing until awaited with recv()"]
pub struct PendingResponse<T> {
    reference: RequestRef,
    rx: oneshot::Receiver<Result<Value>>,
    _response: PhantomData<fn() -> T>,
}

impl<T: RequestType> PendingResponse<T> {
    /// Wraps a correlation receiver in a typed handle.
    pub(crate) fn new(reference: RequestRef, rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self {
            reference,
            rx,
            _response: PhantomData,
        }
    }

    /// Returns the correlation id of the underlying request.
    #[inline]
    #[must_use]
    pub fn reference(&self) -> RequestRef {
        self.reference
    }

    /// Waits for the response and decodes it as `T`.
    ///
    /// # Errors
    ///
    /// - [`Error::Response`] if the server answered with `success: false`
    /// - [`Error::ConnectionReset`] if a reconnect was initiated first
    /// - [`Error::ConnectionClosed`] if the client was disconnected
    /// - [`Error::Json`] if the payload does not match `T`
    pub async fn recv(self) -> Result<T> {
        let payload = self.rx.await??;
        T::decode(payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
