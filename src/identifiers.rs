//! Type-safe correlation identifier.
//!
//! Correlation ids link a request envelope to its eventual response. They
//! are generated on the sending side without coordination with the peer, so
//! they must be collision-free for the lifetime of a connection: a random
//! 128-bit UUID rendered as a string satisfies this without a counter.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// RequestRef
// ============================================================================

/// Correlation id carried in the `ref` field of an envelope.
///
/// Serializes as a plain UUID string on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestRef(Uuid);

impl RequestRef {
    /// Generates a fresh random correlation id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for RequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for RequestRef {
    #[inline]
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Tests
// ============================================================================
