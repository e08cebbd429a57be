//! Detector Error Types
//!
//! Every variant here is fatal: analysis cannot continue once the clock
//! representation is exhausted or the event stream contradicts itself.
//! Detected races are *not* errors; they flow to a [`RaceSink`].
//!
//! [`RaceSink`]: crate::domain::RaceSink

use super::ids::ThreadId;

/// Fatal detector failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectorError {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Capacity Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Thread id does not fit in the configured tid bit-width
    #[error("{tid} exceeds configured thread capacity of {max}")]
    ThreadCapacityExceeded {
        /// Offending thread
        tid: ThreadId,
        /// Configured maximum thread count
        max: u64,
    },

    /// A clock field would overflow its bit-width
    #[error("logical clock of {tid} overflowed")]
    ClockOverflow {
        /// Thread whose slot overflowed
        tid: ThreadId,
    },

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Consistency Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The event stream contradicts the detector's model (checked builds only)
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Event refers to a thread that was joined and never re-created
    #[error("event for unknown {0}")]
    UnknownThread(ThreadId),

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Configuration Errors
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Configuration rejected by [`DetectorConfig::validate`]
    ///
    /// [`DetectorConfig::validate`]: crate::domain::DetectorConfig::validate
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used throughout the detector
pub type DetectorResult<T> = Result<T, DetectorError>;
