//! Wire envelope type.
//!
//! One envelope is exchanged per physical text frame.
//!
//! # Format
//!
//! | Shape | Fields |
//! |-------|--------|
//! | Fire-and-forget request | `{type, data}` |
//! | Correlated request | `{type, ref, data}` |
//! | Success response | `{type: "RESPONSE", ref, data}` |
//! | Failure response | `{type: "RESPONSE", ref, success: false, error, errno}` |
//!
//! A missing `success` field means success. Every `RESPONSE` envelope must
//! carry a `ref`; a `ref` on any other type marks a request expecting a
//! reply.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestRef;

// ============================================================================
// Constants
// ============================================================================

/// Reserved type tag marking a response envelope.
pub const RESPONSE_TYPE: &str = "RESPONSE";

// ============================================================================
// Envelope
// ============================================================================

/// A single wire-level unit exchanged over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Request-type tag, or the reserved literal `RESPONSE`.
    #[serde(rename = "type")]
    pub type_tag: String,

    /// Correlation id, present on correlated requests and responses.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<RequestRef>,

    /// Opaque payload.
    #[serde(default)]
    pub data: Value,

    /// Response outcome flag; absent means success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    /// Error message, present only on failure responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Numeric error code, present only on failure responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i64>,
}

impl Envelope {
    /// Creates a fire-and-forget request envelope.
    #[inline]
    #[must_use]
    pub fn request(type_tag: impl Into<String>, data: Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            reference: None,
            data,
            success: None,
            error: None,
            errno: None,
        }
    }

    /// Creates a correlated request envelope.
    #[inline]
    #[must_use]
    pub fn correlated(type_tag: impl Into<String>, reference: RequestRef, data: Value) -> Self {
        Self {
            type_tag: type_tag.into(),
            reference: Some(reference),
            data,
            success: None,
            error: None,
            errno: None,
        }
    }

    /// Creates a success response envelope for the given correlation id.
    #[inline]
    #[must_use]
    pub fn response(reference: RequestRef, data: Value) -> Self {
        Self {
            type_tag: RESPONSE_TYPE.to_string(),
            reference: Some(reference),
            data,
            success: None,
            error: None,
            errno: None,
        }
    }

    /// Creates a failure response envelope for the given correlation id.
    #[inline]
    #[must_use]
    pub fn failure(reference: RequestRef, error: impl Into<String>, errno: i64) -> Self {
        Self {
            type_tag: RESPONSE_TYPE.to_string(),
            reference: Some(reference),
            data: Value::Null,
            success: Some(false),
            error: Some(error.into()),
            errno: Some(errno),
        }
    }

    /// Returns `true` if this envelope is a response.
    #[inline]
    #[must_use]
    pub fn is_response(&self) -> bool {
        self.type_tag == RESPONSE_TYPE
    }

    /// Returns `true` if this envelope reports success.
    ///
    /// A missing `success` field defaults to true.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success.unwrap_or(true)
    }
}

// ============================================================================
// Tests
// ============================================================================
