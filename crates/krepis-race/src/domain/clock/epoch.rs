//! Epochs - Packed (thread, clock) Pairs
//!
//! An epoch names one event of one thread. It is packed into a single `u64`
//! so the per-location shadow state can hold the last writer and last reader
//! in two atomics and the fast path can compare them with one load.
//!
//! # Bit Layout
//!
//! ```text
//!  63                 CLOCK_BITS                     0
//! ┌──────────────────┬───────────────────────────────┐
//! │    tid field     │          clock field          │
//! │  (TID_BITS wide) │        (CLOCK_BITS wide)      │
//! └──────────────────┴───────────────────────────────┘
//! ```
//!
//! `TID_BITS` is derived from the configured maximum thread count. The tid sits
//! in the high bits, so two epochs of the *same* thread compare correctly as
//! raw integers. Every comparison the detector makes is within one vector-clock
//! slot, which is why [`Epoch::leq`] needs no layout.
//!
//! The all-ones tid field is never handed out to a thread: the all-ones word is
//! [`Epoch::READ_SHARED`], the sentinel meaning "consult the read vector".

use crate::domain::error::{DetectorError, DetectorResult};
use crate::domain::ids::ThreadId;
use std::fmt;

/// Largest supported `max_threads` (leaves at least two clock bits)
pub const MAX_SUPPORTED_THREADS: u64 = 1 << 61;

/// Packed (tid, clock) pair
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Epoch(u64);

impl Epoch {
    /// Thread 0 at clock 0
    pub const ZERO: Self = Self(0);

    /// Sentinel: multiple concurrent readers, consult the read vector
    pub const READ_SHARED: Self = Self(u64::MAX);

    /// Reinterpret a raw word (as loaded from a shadow atomic)
    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw word for atomic storage
    #[inline(always)]
    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Whether this is the shared-read sentinel
    #[inline(always)]
    pub const fn is_read_shared(self) -> bool {
        self.0 == u64::MAX
    }

    /// Clock-field comparison of two epochs from the same thread slot
    #[inline(always)]
    pub const fn leq(self, other: Self) -> bool {
        self.0 <= other.0
    }

    /// Later of two epochs from the same thread slot
    #[inline(always)]
    pub const fn max(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

/// Bit split between tid and clock, fixed at detector construction
///
/// # Example
///
/// ```rust
/// use krepis_race::domain::{EpochLayout, ThreadId};
///
/// let layout = EpochLayout::for_max_threads(4).unwrap();
/// let e = layout.make(ThreadId::new(3), 17);
/// assert_eq!(layout.tid(e), ThreadId::new(3));
/// assert_eq!(layout.clock(e), 17);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EpochLayout {
    tid_bits: u32,
    max_threads: u64,
}

impl EpochLayout {
    /// Derive the layout for `max_threads` threads
    ///
    /// `TID_BITS` is the width needed to represent `max_threads` itself, so
    /// the largest valid tid (`max_threads - 1`) is always below the reserved
    /// all-ones tid field.
    pub fn for_max_threads(max_threads: u64) -> DetectorResult<Self> {
        if max_threads == 0 || max_threads > MAX_SUPPORTED_THREADS {
            return Err(DetectorError::InvalidConfig(format!(
                "max_threads must be in 1..={MAX_SUPPORTED_THREADS}, got {max_threads}"
            )));
        }
        let tid_bits = u64::BITS - max_threads.leading_zeros();
        Ok(Self {
            tid_bits,
            max_threads,
        })
    }

    /// Width of the tid field
    #[inline(always)]
    pub const fn tid_bits(self) -> u32 {
        self.tid_bits
    }

    /// Width of the clock field
    #[inline(always)]
    pub const fn clock_bits(self) -> u32 {
        u64::BITS - self.tid_bits
    }

    /// Largest representable clock value
    #[inline(always)]
    pub const fn max_clock(self) -> u64 {
        (1u64 << self.clock_bits()) - 1
    }

    /// Configured thread capacity
    #[inline(always)]
    pub const fn max_threads(self) -> u64 {
        self.max_threads
    }

    /// Whether `tid` fits in this layout
    #[inline(always)]
    pub const fn admits(self, tid: ThreadId) -> bool {
        (tid.0 as u64) < self.max_threads
    }

    /// Reject a thread id beyond the configured capacity
    pub fn check_tid(self, tid: ThreadId) -> DetectorResult<()> {
        if self.admits(tid) {
            Ok(())
        } else {
            Err(DetectorError::ThreadCapacityExceeded {
                tid,
                max: self.max_threads,
            })
        }
    }

    /// Pack `(tid, clock)`
    #[inline]
    pub fn make(self, tid: ThreadId, clock: u64) -> Epoch {
        debug_assert!(self.admits(tid), "{tid} outside layout");
        debug_assert!(clock <= self.max_clock(), "clock {clock} outside layout");
        Epoch(((tid.0 as u64) << self.clock_bits()) | clock)
    }

    /// Identity epoch `(tid, 0)` of an untouched slot
    #[inline(always)]
    pub fn identity(self, tid: ThreadId) -> Epoch {
        self.make(tid, 0)
    }

    /// Thread field
    #[inline(always)]
    pub const fn tid(self, e: Epoch) -> ThreadId {
        ThreadId((e.0 >> self.clock_bits()) as u32)
    }

    /// Clock field
    #[inline(always)]
    pub const fn clock(self, e: Epoch) -> u64 {
        e.0 & self.max_clock()
    }

    /// Advance the clock field by one
    ///
    /// Fails with [`DetectorError::ClockOverflow`] when the clock is already
    /// at `2^CLOCK_BITS - 1`.
    #[inline]
    pub fn tick(self, e: Epoch) -> DetectorResult<Epoch> {
        if self.clock(e) >= self.max_clock() {
            return Err(DetectorError::ClockOverflow { tid: self.tid(e) });
        }
        Ok(Epoch(e.0 + 1))
    }

    /// Human-readable `tid@clock`
    pub fn display(self, e: Epoch) -> String {
        if e.is_read_shared() {
            "SHARED".to_string()
        } else {
            format!("{}@{}", self.tid(e).0, self.clock(e))
        }
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_read_shared() {
            write!(f, "Epoch(SHARED)")
        } else {
            write!(f, "Epoch({:#x})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_bits() {
        let layout = EpochLayout::for_max_threads(4).unwrap();
        assert_eq!(layout.tid_bits(), 3);
        assert_eq!(layout.clock_bits(), 61);

        let layout = EpochLayout::for_max_threads(1).unwrap();
        assert_eq!(layout.tid_bits(), 1);

        let layout = EpochLayout::for_max_threads(1024).unwrap();
        assert_eq!(layout.tid_bits(), 11);
        assert_eq!(layout.max_clock(), (1 << 53) - 1);
    }

    #[test]
    fn test_layout_rejects_bad_capacity() {
        assert!(EpochLayout::for_max_threads(0).is_err());
        assert!(EpochLayout::for_max_threads(MAX_SUPPORTED_THREADS + 1).is_err());
        assert!(EpochLayout::for_max_threads(MAX_SUPPORTED_THREADS).is_ok());
    }

    #[test]
    fn test_make_round_trip() {
        let layout = EpochLayout::for_max_threads(8).unwrap();
        let e = layout.make(ThreadId::new(5), 99);
        assert_eq!(layout.tid(e), ThreadId::new(5));
        assert_eq!(layout.clock(e), 99);
    }

    #[test]
    fn test_largest_tid_never_read_shared() {
        let layout = EpochLayout::for_max_threads(8).unwrap();
        let e = layout.make(ThreadId::new(7), layout.max_clock());
        assert!(!e.is_read_shared());
    }

    #[test]
    fn test_tick_overflow() {
        let layout = EpochLayout::for_max_threads(1 << 60).unwrap();
        assert_eq!(layout.max_clock(), 7);
        let mut e = layout.identity(ThreadId::new(2));
        for _ in 0..7 {
            e = layout.tick(e).unwrap();
        }
        assert_eq!(layout.clock(e), 7);
        assert_eq!(
            layout.tick(e),
            Err(DetectorError::ClockOverflow { tid: ThreadId::new(2) })
        );
    }

    #[test]
    fn test_leq_within_slot() {
        let layout = EpochLayout::for_max_threads(16).unwrap();
        let a = layout.make(ThreadId::new(3), 4);
        let b = layout.make(ThreadId::new(3), 9);
        assert!(a.leq(b));
        assert!(!b.leq(a));
        assert_eq!(a.max(b), b);
    }

    #[test]
    fn test_capacity_check() {
        let layout = EpochLayout::for_max_threads(2).unwrap();
        assert!(layout.check_tid(ThreadId::new(1)).is_ok());
        assert!(matches!(
            layout.check_tid(ThreadId::new(2)),
            Err(DetectorError::ThreadCapacityExceeded { max: 2, .. })
        ));
    }
}
