//! Wire protocol message types.
//!
//! This module defines the envelope exchanged over the WebSocket and the
//! contract a typed request must satisfy.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | Request (no `ref`) | Either | Fire-and-forget notification |
//! | Request (with `ref`) | Either | Correlated request expecting a reply |
//! | `RESPONSE` | Either | Reply matched to a pending request by `ref` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Wire envelope and response tag |
//! | `request` | [`RequestType`] contract |

// ============================================================================
// Submodules
// ============================================================================

/// Wire envelope type.
pub mod envelope;

/// Request type contract.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{Envelope, RESPONSE_TYPE};
pub use request::RequestType;
