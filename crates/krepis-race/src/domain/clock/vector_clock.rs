//! Vector Clock Implementation
//!
//! Vector clocks track what each thread causally knows about every other
//! thread. Entry `i` is the latest epoch of thread `i` that the owner has
//! observed, under whichever relation the clock belongs to.
//!
//! # Theory
//!
//! Given an access by thread `t` at epoch `e` and a later access by thread `u`
//! with clock `V`:
//! - the first access is ordered before the second iff `e <= V[t]`
//! - otherwise the two accesses are concurrent under that relation
//!
//! # Implementation
//!
//! Growable `Vec<Epoch>`. Indices beyond the end are implicitly the identity
//! epoch `(i, 0)`. Capacity only ever grows, and every exposed slot starts at
//! identity, so entry `i` always carries tid `i`.

use super::epoch::{Epoch, EpochLayout};
use crate::domain::error::DetectorResult;
use crate::domain::ids::ThreadId;
use std::fmt;

/// Initial slot count for freshly created clocks
pub const INIT_VECTOR_CLOCK_SIZE: usize = 4;

/// Vector clock over packed epochs
///
/// # Example
///
/// ```text
/// Thread 0: [0@5, 1@2, 2@3]  (T0 at 5, last saw T1 at 2, T2 at 3)
/// Thread 1: [0@4, 1@7, 2@3]  (T1 at 7, last saw T0 at 4, T2 at 3)
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct VectorClock {
    layout: EpochLayout,
    entries: Vec<Epoch>,
}

impl VectorClock {
    /// Empty clock (every slot at identity)
    #[inline]
    pub fn new(layout: EpochLayout) -> Self {
        Self {
            layout,
            entries: Vec::with_capacity(INIT_VECTOR_CLOCK_SIZE),
        }
    }

    /// Clock with `len` identity slots preallocated
    pub fn with_len(layout: EpochLayout, len: usize) -> Self {
        let mut vc = Self::new(layout);
        vc.ensure_len(len);
        vc
    }

    /// Layout shared with every epoch stored here
    #[inline(always)]
    pub const fn layout(&self) -> EpochLayout {
        self.layout
    }

    /// Number of materialized slots
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slot has been materialized
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_len(&mut self, len: usize) {
        let layout = self.layout;
        let old = self.entries.len();
        if len > old {
            self.entries.extend((old..len).map(|i| layout.identity(ThreadId(i as u32))));
        }
    }

    /// Epoch stored for `tid` (identity when never set)
    #[inline]
    pub fn get(&self, tid: ThreadId) -> Epoch {
        match self.entries.get(tid.as_usize()) {
            Some(&e) => e,
            None => self.layout.identity(tid),
        }
    }

    /// Overwrite slot `tid`; the epoch must belong to that slot
    #[inline]
    pub fn set(&mut self, tid: ThreadId, epoch: Epoch) {
        debug_assert_eq!(self.layout.tid(epoch), tid, "epoch stored in foreign slot");
        let idx = tid.as_usize();
        self.ensure_len(idx + 1);
        self.entries[idx] = epoch;
    }

    /// Advance the owner's own slot
    ///
    /// ```rust,ignore
    /// let mut vc = VectorClock::new(layout);
    /// vc.tick(ThreadId(0))?;  // [0@1]
    /// vc.tick(ThreadId(0))?;  // [0@2]
    /// ```
    #[inline]
    pub fn tick(&mut self, tid: ThreadId) -> DetectorResult<Epoch> {
        let next = self.layout.tick(self.get(tid))?;
        self.set(tid, next);
        Ok(next)
    }

    /// Pointwise maximum, growing to cover `other`
    ///
    /// ```text
    /// self:  [0@3, 1@1, 2@2]
    /// other: [0@2, 1@5]
    /// result:[0@3, 1@5, 2@2]
    /// ```
    #[inline]
    pub fn max(&mut self, other: &VectorClock) {
        self.ensure_len(other.entries.len());
        for (mine, &theirs) in self.entries.iter_mut().zip(other.entries.iter()) {
            *mine = mine.max(theirs);
        }
    }

    /// Whether some slot of `self` strictly dominates the same slot of `other`
    pub fn any_gt(&self, other: &VectorClock) -> bool {
        self.entries
            .iter()
            .enumerate()
            .any(|(i, &e)| !e.leq(other.get(ThreadId(i as u32))))
    }

    /// `self <= other` pointwise
    #[inline]
    pub fn leq(&self, other: &VectorClock) -> bool {
        !self.any_gt(other)
    }

    /// First slot `>= start` where `self` strictly dominates `other`
    ///
    /// Used to enumerate every prior reader that is concurrent with a write.
    pub fn next_gt(&self, other: &VectorClock, start: usize) -> Option<usize> {
        (start..self.entries.len())
            .find(|&i| !self.entries[i].leq(other.get(ThreadId(i as u32))))
    }

    /// Overwrite every slot from `other`
    ///
    /// Slots beyond `other`'s length reset to identity; capacity is kept.
    pub fn copy_from(&mut self, other: &VectorClock) {
        self.ensure_len(other.entries.len());
        let layout = self.layout;
        for (i, slot) in self.entries.iter_mut().enumerate() {
            *slot = match other.entries.get(i) {
                Some(&e) => e,
                None => layout.identity(ThreadId(i as u32)),
            };
        }
    }

    /// Reset every slot to identity, keeping capacity
    pub fn clear(&mut self) {
        let layout = self.layout;
        for (i, slot) in self.entries.iter_mut().enumerate() {
            *slot = layout.identity(ThreadId(i as u32));
        }
    }

    /// Materialized `(tid, epoch)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (ThreadId, Epoch)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, &e)| (ThreadId(i as u32), e))
    }
}

impl fmt::Debug for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VC[")?;
        for (i, &e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.layout.display(e))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::DetectorError;

    fn layout() -> EpochLayout {
        EpochLayout::for_max_threads(16).unwrap()
    }

    fn vc(clocks: &[u64]) -> VectorClock {
        let l = layout();
        let mut vc = VectorClock::new(l);
        for (i, &c) in clocks.iter().enumerate() {
            vc.set(ThreadId(i as u32), l.make(ThreadId(i as u32), c));
        }
        vc
    }

    fn clock_of(v: &VectorClock, tid: u32) -> u64 {
        v.layout().clock(v.get(ThreadId(tid)))
    }

    #[test]
    fn test_missing_entries_are_identity() {
        let v = VectorClock::new(layout());
        assert_eq!(v.get(ThreadId(5)), layout().identity(ThreadId(5)));
        assert!(v.is_empty());
    }

    #[test]
    fn test_tick() {
        let mut v = VectorClock::new(layout());
        v.tick(ThreadId(0)).unwrap();
        assert_eq!(clock_of(&v, 0), 1);
        assert_eq!(clock_of(&v, 1), 0);

        v.tick(ThreadId(0)).unwrap();
        assert_eq!(clock_of(&v, 0), 2);
    }

    #[test]
    fn test_max_grows() {
        let mut a = vc(&[3, 1]);
        let b = vc(&[2, 5, 1]);
        a.max(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(clock_of(&a, 0), 3);
        assert_eq!(clock_of(&a, 1), 5);
        assert_eq!(clock_of(&a, 2), 1);
    }

    #[test]
    fn test_any_gt_and_leq() {
        let a = vc(&[1, 2, 3]);
        let b = vc(&[2, 3, 4]);
        assert!(a.leq(&b));
        assert!(!b.leq(&a));
        assert!(b.any_gt(&a));

        let c = vc(&[1, 3, 2]);
        let d = vc(&[2, 1, 3]);
        assert!(c.any_gt(&d));
        assert!(d.any_gt(&c));
    }

    #[test]
    fn test_leq_against_shorter_clock() {
        let a = vc(&[0, 0, 0, 0]);
        let b = vc(&[]);
        assert!(a.leq(&b));
        let c = vc(&[0, 0, 1]);
        assert!(!c.leq(&b));
    }

    #[test]
    fn test_next_gt_enumerates_dominating_slots() {
        let readers = vc(&[4, 1, 7, 2]);
        let writer = vc(&[5, 1, 3, 1]);
        assert_eq!(readers.next_gt(&writer, 0), Some(2));
        assert_eq!(readers.next_gt(&writer, 3), Some(3));
        assert_eq!(readers.next_gt(&writer, 4), None);
    }

    #[test]
    fn test_copy_resets_tail() {
        let mut a = vc(&[4, 4, 4]);
        let b = vc(&[1]);
        a.copy_from(&b);
        assert_eq!(a.len(), 3);
        assert_eq!(clock_of(&a, 0), 1);
        assert_eq!(clock_of(&a, 1), 0);
        assert_eq!(clock_of(&a, 2), 0);
        assert_eq!(a.layout().tid(a.get(ThreadId(2))), ThreadId(2));
    }

    #[test]
    fn test_clear_keeps_slot_tids() {
        let mut a = vc(&[4, 4]);
        a.clear();
        assert_eq!(a.len(), 2);
        assert_eq!(a.get(ThreadId(1)), layout().identity(ThreadId(1)));
    }

    #[test]
    fn test_tick_overflow_is_fatal() {
        let l = EpochLayout::for_max_threads(1 << 60).unwrap();
        let mut v = VectorClock::new(l);
        let ticks = 1u64 << l.clock_bits();
        for _ in 1..ticks {
            v.tick(ThreadId(1)).unwrap();
        }
        assert_eq!(
            v.tick(ThreadId(1)),
            Err(DetectorError::ClockOverflow { tid: ThreadId(1) })
        );
    }

    #[test]
    fn test_debug_format() {
        let v = vc(&[2, 0]);
        assert_eq!(format!("{v:?}"), "VC[0@2, 1@0]");
    }
}
