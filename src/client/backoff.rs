//! Reconnection backoff schedule.
//!
//! Two distinct failure regimes get two distinct schedules:
//!
//! - **Connect-attempt failure**: the server or network is unreachable, so
//!   delays escalate 5s per consecutive failure, capped at 60s.
//! - **Post-connect drop**: the link was up and then closed, so a single
//!   retry is scheduled after a flat 1 second (gated by the caller's
//!   reconnection policy, which is never consulted for connect errors).

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Flat delay before retrying after an unsolicited disconnect.
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Step between consecutive connect-error delays, in seconds.
const BACKOFF_STEP_SECS: u64 = 5;

/// Upper bound for the connect-error delay, in seconds.
const BACKOFF_CAP_SECS: u64 = 60;

// ============================================================================
// ReconnectBackoff
// ============================================================================

/// Consecutive connect-failure counter and derived delay.
///
/// Delay sequence: 5, 10, 15, ..., 60, 60, 60, ... seconds. The counter
/// resets to zero on any successful connect.
#[derive(Debug, Default)]
pub(crate) struct ReconnectBackoff {
    failures: u32,
}

impl ReconnectBackoff {
    /// Creates a backoff tracker with no recorded failures.
    #[inline]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a failure and returns the delay before the next attempt.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let secs = BACKOFF_CAP_SECS.min(BACKOFF_STEP_SECS * (u64::from(self.failures) + 1));
        self.failures += 1;
        Duration::from_secs(secs)
    }

    /// Resets the failure counter after a successful connect.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.failures = 0;
    }

    /// Returns the number of consecutive failures recorded.
    #[inline]
    pub(crate) fn failures(&self) -> u32 {
        self.failures
    }
}

// ============================================================================
// Tests
// ============================================================================
