//! Request type contract.
//!
//! A request type describes one kind of message that can travel over the
//! connection: a stable string tag plus a serde-backed payload shape. The
//! same contract covers outbound requests, inbound requests, and response
//! payloads — request and response may be structurally different types
//! correlated only by the wire `type` convention.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// RequestType
// ============================================================================

/// A typed message that can be carried in an envelope's `data` field.
///
/// Implementors provide the wire tag; serde provides the (de)serializer.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use websocket_request::RequestType;
///
/// #[derive(Serialize, Deserialize)]
/// struct ChatMessage {
///     text: String,
/// }
///
/// impl RequestType for ChatMessage {
///     const TYPE: &'static str = "chat.message";
/// }
/// ```
pub trait RequestType: Serialize + DeserializeOwned + Send + 'static {
    /// Stable wire tag identifying this request type.
    const TYPE: &'static str;

    /// Serializes this value into an envelope payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    fn encode(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserializes an envelope payload into this type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the payload does not
    /// match this type's shape.
    fn decode(data: Value) -> Result<Self> {
        Ok(serde_json::from_value(data)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
