//! Per-Thread Causality State
//!
//! A [`ThreadContext`] is what one program thread knows, under one relation.
//! It is touched almost exclusively by its own thread; the exceptions are
//! fork (the parent seeds a child that has not started) and join (the parent
//! absorbs a child that has terminated).
//!
//! # Clocks
//!
//! ```text
//! ThreadContext
//!   ├─ clock / epoch        relation clock V, cached V[tid]
//!   ├─ hb: Option<HbShadow> WCP only: HB clock vHB, cached vHB[tid]
//!   ├─ held                 locks currently held, outermost first
//!   └─ snapshots            cached held-lock snapshot list
//! ```
//!
//! WCP accesses run at the HB epoch and are checked against "WCP ∪ program
//! order": the relation clock with the thread's own slot replaced by the HB
//! epoch. [`ThreadContext::knows`] exposes that view without materializing it.

use crate::domain::clock::{Epoch, EpochLayout, VectorClock};
use crate::domain::error::DetectorResult;
use crate::domain::ids::ThreadId;
use crate::domain::lock::LockShadow;
use crate::domain::shadow::{SnapshotEntry, SnapshotList};
use crate::infrastructure::Handle;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;

/// Critical-section clock shared between a lock and the snapshot lists
pub type SharedClock = Arc<RwLock<VectorClock>>;

/// HB clock carried by WCP threads
#[derive(Debug, Clone)]
pub struct HbShadow {
    clock: VectorClock,
    epoch: Epoch,
}

/// One entry of the held-lock stack
#[derive(Clone)]
pub struct HeldLock {
    /// Shadow of the held lock
    pub lock: Arc<LockShadow>,
    /// Critical-section clock in snapshot mode
    pub snapshot: Option<SharedClock>,
}

/// Causality state of one thread under one relation
pub struct ThreadContext {
    tid: ThreadId,
    clock: VectorClock,
    epoch: Epoch,
    hb: Option<HbShadow>,
    held: SmallVec<[HeldLock; 4]>,
    snapshots: Option<SnapshotList>,
    waiting: SmallVec<[(Handle, u32); 1]>,
}

impl ThreadContext {
    /// Fresh context with own slot seeded at `seed`
    ///
    /// With `hb_shadow` the HB clock is seeded identically.
    pub fn new(tid: ThreadId, layout: EpochLayout, seed: u64, hb_shadow: bool) -> Self {
        let epoch = layout.make(tid, seed);
        let mut clock = VectorClock::new(layout);
        clock.set(tid, epoch);
        let hb = hb_shadow.then(|| HbShadow {
            clock: clock.clone(),
            epoch,
        });
        Self {
            tid,
            clock,
            epoch,
            hb,
            held: SmallVec::new(),
            snapshots: None,
            waiting: SmallVec::new(),
        }
    }

    /// Owning thread
    #[inline(always)]
    pub const fn tid(&self) -> ThreadId {
        self.tid
    }

    /// Epoch layout
    #[inline(always)]
    pub fn layout(&self) -> EpochLayout {
        self.clock.layout()
    }

    /// Relation clock
    #[inline(always)]
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Cached relation epoch `V[tid]`
    #[inline(always)]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// HB clock, when the relation carries one
    #[inline]
    pub fn hb_clock(&self) -> Option<&VectorClock> {
        self.hb.as_ref().map(|hb| &hb.clock)
    }

    /// Epoch stamped on this thread's accesses
    #[inline(always)]
    pub fn access_epoch(&self) -> Epoch {
        match &self.hb {
            Some(hb) => hb.epoch,
            None => self.epoch,
        }
    }

    /// Clock other threads learn from: hard edges, Rule (a), snapshots
    #[inline]
    pub fn publish_clock(&self) -> &VectorClock {
        match &self.hb {
            Some(hb) => &hb.clock,
            None => &self.clock,
        }
    }

    /// What this thread knows about `other`'s slot, program order included
    #[inline]
    pub fn knows(&self, other: ThreadId) -> Epoch {
        match &self.hb {
            Some(hb) if other == self.tid => hb.epoch,
            _ => self.clock.get(other),
        }
    }

    /// Whether a prior access at `prior` is ordered before this thread
    #[inline]
    pub fn ordered(&self, prior: Epoch) -> bool {
        prior.leq(self.knows(self.layout().tid(prior)))
    }

    /// First slot `>= start` of `readers` not ordered before this thread
    pub fn first_unordered(&self, readers: &VectorClock, start: usize) -> Option<ThreadId> {
        readers
            .iter()
            .skip(start)
            .find(|&(t, e)| !e.leq(self.knows(t)))
            .map(|(t, _)| t)
    }

    /// Copy of the relation clock with the own slot at the access epoch
    pub fn program_order_union(&self) -> VectorClock {
        let mut union = self.clock.clone();
        union.set(self.tid, self.access_epoch());
        union
    }

    /// Join `other` into the relation clock
    #[inline]
    pub fn absorb(&mut self, other: &VectorClock) {
        self.clock.max(other);
        self.epoch = self.clock.get(self.tid);
    }

    /// Join `other` into the HB clock (no-op without one)
    #[inline]
    pub fn absorb_hb(&mut self, other: &VectorClock) {
        if let Some(hb) = &mut self.hb {
            hb.clock.max(other);
            hb.epoch = hb.clock.get(self.tid);
        }
    }

    /// Join a hard (true happens-before) edge into every clock
    pub fn absorb_hard(&mut self, other: &VectorClock) {
        self.absorb_hb(other);
        self.absorb(other);
    }

    /// Advance program order
    ///
    /// Ticks the HB clock when present, otherwise the relation clock.
    pub fn advance(&mut self) -> DetectorResult<()> {
        match &mut self.hb {
            Some(hb) => {
                hb.epoch = hb.clock.tick(self.tid)?;
            }
            None => {
                self.epoch = self.clock.tick(self.tid)?;
            }
        }
        Ok(())
    }

    /// Clock value recorded when the thread is joined
    pub fn final_clock(&self) -> u64 {
        let layout = self.layout();
        layout.clock(self.epoch).max(layout.clock(self.access_epoch()))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Held Locks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Locks currently held, outermost first
    #[inline]
    pub fn held(&self) -> &[HeldLock] {
        &self.held
    }

    /// Owned copies of the held lock shadows, outermost first
    pub fn held_locks(&self) -> SmallVec<[Arc<LockShadow>; 4]> {
        self.held.iter().map(|h| Arc::clone(&h.lock)).collect()
    }

    /// Whether `lock` is on the held stack
    pub fn holds(&self, lock: &LockShadow) -> bool {
        self.held.iter().any(|h| h.lock.handle() == lock.handle())
    }

    /// Push a newly acquired lock and refresh the snapshot list
    pub fn push_held(&mut self, lock: Arc<LockShadow>, snapshot: Option<SharedClock>) {
        self.held.push(HeldLock { lock, snapshot });
        self.rebuild_snapshots();
    }

    /// Remove a released lock (innermost match) and refresh the snapshot list
    pub fn pop_held(&mut self, lock: &LockShadow) -> bool {
        let found = self
            .held
            .iter()
            .rposition(|h| h.lock.handle() == lock.handle());
        if let Some(pos) = found {
            self.held.remove(pos);
            self.rebuild_snapshots();
        }
        found.is_some()
    }

    /// Current held-lock snapshot list (None when no lock is held)
    #[inline]
    pub fn snapshots(&self) -> Option<SnapshotList> {
        self.snapshots.clone()
    }

    /// Remember the hold depth given up by `wait` on `lock`
    pub fn begin_wait(&mut self, lock: Handle, depth: u32) {
        self.waiting.push((lock, depth));
    }

    /// Hold depth to restore when `wait` on `lock` returns
    pub fn end_wait(&mut self, lock: Handle) -> Option<u32> {
        let pos = self.waiting.iter().rposition(|&(h, _)| h == lock)?;
        Some(self.waiting.remove(pos).1)
    }

    fn rebuild_snapshots(&mut self) {
        let entries: Vec<SnapshotEntry> = self
            .held
            .iter()
            .filter_map(|h| {
                h.snapshot.as_ref().map(|clock| SnapshotEntry {
                    lock: Arc::clone(&h.lock),
                    clock: Arc::clone(clock),
                })
            })
            .collect();
        self.snapshots = if entries.is_empty() {
            None
        } else {
            Some(entries.into())
        };
    }
}

impl std::fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadContext")
            .field("tid", &self.tid)
            .field("clock", &self.clock)
            .field("hb", &self.hb.as_ref().map(|hb| &hb.clock))
            .field("held", &self.held.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> EpochLayout {
        EpochLayout::for_max_threads(8).unwrap()
    }

    #[test]
    fn test_seeded_epoch() {
        let ctx = ThreadContext::new(ThreadId(2), layout(), 5, false);
        assert_eq!(layout().clock(ctx.epoch()), 5);
        assert_eq!(ctx.access_epoch(), ctx.epoch());
        assert!(ctx.hb_clock().is_none());
    }

    #[test]
    fn test_advance_ticks_hb_when_present() {
        let mut ctx = ThreadContext::new(ThreadId(1), layout(), 1, true);
        ctx.advance().unwrap();
        assert_eq!(layout().clock(ctx.epoch()), 1);
        assert_eq!(layout().clock(ctx.access_epoch()), 2);
        assert_eq!(ctx.final_clock(), 2);
    }

    #[test]
    fn test_knows_uses_program_order_for_own_slot() {
        let mut ctx = ThreadContext::new(ThreadId(1), layout(), 1, true);
        ctx.advance().unwrap();
        ctx.advance().unwrap();
        let own = ctx.access_epoch();
        assert!(ctx.ordered(own));
        assert_eq!(ctx.program_order_union().get(ThreadId(1)), own);
        assert!(!own.leq(ctx.clock().get(ThreadId(1))));
    }

    #[test]
    fn test_absorb_updates_cached_epoch() {
        let l = layout();
        let mut ctx = ThreadContext::new(ThreadId(0), l, 1, false);
        let mut other = VectorClock::new(l);
        other.set(ThreadId(0), l.make(ThreadId(0), 9));
        other.set(ThreadId(3), l.make(ThreadId(3), 4));
        ctx.absorb(&other);
        assert_eq!(l.clock(ctx.epoch()), 9);
        assert!(ctx.ordered(l.make(ThreadId(3), 4)));
        assert!(!ctx.ordered(l.make(ThreadId(3), 5)));
    }

    #[test]
    fn test_wait_depth_round_trip() {
        let arena = crate::infrastructure::Arena::new();
        let (lock, _) = arena.insert_with(|_| ());
        let mut ctx = ThreadContext::new(ThreadId(0), layout(), 1, false);
        assert_eq!(ctx.end_wait(lock), None);
        ctx.begin_wait(lock, 3);
        assert_eq!(ctx.end_wait(lock), Some(3));
        assert_eq!(ctx.end_wait(lock), None);
    }

    #[test]
    fn test_first_unordered_skips_known_readers() {
        let l = layout();
        let mut ctx = ThreadContext::new(ThreadId(0), l, 3, false);
        let mut seen = VectorClock::new(l);
        seen.set(ThreadId(1), l.make(ThreadId(1), 2));
        ctx.absorb(&seen);

        let mut readers = VectorClock::new(l);
        readers.set(ThreadId(0), l.make(ThreadId(0), 3));
        readers.set(ThreadId(1), l.make(ThreadId(1), 2));
        readers.set(ThreadId(2), l.make(ThreadId(2), 1));
        assert_eq!(ctx.first_unordered(&readers, 0), Some(ThreadId(2)));
        assert_eq!(ctx.first_unordered(&readers, 3), None);
    }
}
