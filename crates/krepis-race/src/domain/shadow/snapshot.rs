//! Held-Lock Snapshot Lists
//!
//! In snapshot mode an access remembers, instead of touching per-lock maps,
//! the list of `(lock, Cm)` pairs for every lock its thread held (outermost
//! first). `Cm` is the critical-section clock: `(tid, MAX_CLOCK)` in the
//! owner's slot while the section is open, the releasing clock afterwards.
//!
//! A later conflicting access walks the prior access's list:
//!
//! ```text
//! for (m, Cm) in prior list, outer to inner:
//!     Cm[prior] <= V[prior]   -> ordered, stop
//!     m held by me            -> absorb Cm (Rule a), stop
//!     otherwise               -> not yet decidable, try the next lock
//! ```
//!
//! Writes additionally park the undecided pairs in per-location deferred
//! maps (`Er` for prior reads, `Ew` for prior writes) keyed by prior thread
//! and lock, so a later access under that lock can absorb them.

use crate::domain::ids::ThreadId;
use crate::domain::lock::LockShadow;
use crate::domain::thread::{SharedClock, ThreadContext};
use crate::infrastructure::Handle;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

/// One held lock with its critical-section clock
#[derive(Clone)]
pub struct SnapshotEntry {
    /// Lock shadow (holder is checked atomically during walks)
    pub lock: Arc<LockShadow>,
    /// Critical-section clock of the access's enclosing section on `lock`
    pub clock: SharedClock,
}

impl std::fmt::Debug for SnapshotEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?}, {:?})", self.lock.id(), *self.clock.read())
    }
}

/// Immutable held-lock snapshot list, outermost first
pub type SnapshotList = Arc<[SnapshotEntry]>;

/// Deferred snapshots: prior thread -> lock -> critical-section clock
pub type DeferredSnapshots = HashMap<ThreadId, HashMap<Handle, SharedClock>>;

fn held_handles(ctx: &ThreadContext) -> SmallVec<[Handle; 4]> {
    ctx.held().iter().map(|h| h.lock.handle()).collect()
}

/// Whether the outermost snapshot orders the prior access of `prior`
pub fn outermost_orders(list: &SnapshotList, prior: ThreadId, ctx: &ThreadContext) -> bool {
    list.first()
        .is_some_and(|entry| entry.clock.read().get(prior).leq(ctx.knows(prior)))
}

/// Walk a prior write's list on behalf of a read
///
/// Returns true when ordering was established.
pub fn resolve(list: Option<&SnapshotList>, prior: ThreadId, ctx: &mut ThreadContext) -> bool {
    let Some(list) = list else {
        return false;
    };
    for entry in list.iter() {
        let snap = entry.clock.read();
        if snap.get(prior).leq(ctx.knows(prior)) {
            return true;
        }
        if entry.lock.is_held_by(ctx.tid()) {
            ctx.absorb(&snap);
            return true;
        }
    }
    false
}

/// Walk a prior access's list on behalf of a write, deferring what stays open
///
/// `absorb_held` absorbs the snapshot of a lock the writer holds (prior
/// reads); prior writes only stop there.
pub fn resolve_deferring(
    list: Option<&SnapshotList>,
    prior: ThreadId,
    ctx: &mut ThreadContext,
    deferred: &mut DeferredSnapshots,
    absorb_held: bool,
) -> bool {
    let Some(list) = list else {
        return false;
    };
    for entry in list.iter() {
        let snap = entry.clock.read();
        if snap.get(prior).leq(ctx.knows(prior)) {
            return true;
        }
        if entry.lock.is_held_by(ctx.tid()) {
            if absorb_held {
                ctx.absorb(&snap);
            }
            return true;
        }
        deferred
            .entry(prior)
            .or_default()
            .insert(entry.lock.handle(), Arc::clone(&entry.clock));
    }
    false
}

/// Before a read: absorb deferred prior-write snapshots of held locks
pub fn absorb_deferred_writes(ew: &DeferredSnapshots, ctx: &mut ThreadContext) -> usize {
    if ew.is_empty() {
        return 0;
    }
    let tid = ctx.tid();
    let mut absorbed = 0;
    for lock in held_handles(ctx) {
        for (prev, by_lock) in ew {
            if *prev == tid {
                continue;
            }
            if let Some(clock) = by_lock.get(&lock) {
                ctx.absorb(&clock.read());
                absorbed += 1;
            }
        }
    }
    absorbed
}

/// Before a write: absorb and retire deferred prior-read snapshots of held
/// locks, then forget everything deferred against the writer itself
pub fn absorb_deferred_reads(
    er: &mut DeferredSnapshots,
    ew: &mut DeferredSnapshots,
    ctx: &mut ThreadContext,
) -> usize {
    let tid = ctx.tid();
    let mut absorbed = 0;
    if !er.is_empty() {
        for lock in held_handles(ctx) {
            for (prev, by_lock) in er.iter_mut() {
                if *prev == tid {
                    continue;
                }
                if let Some(clock) = by_lock.remove(&lock) {
                    ctx.absorb(&clock.read());
                    absorbed += 1;
                    if let Some(writes) = ew.get_mut(prev) {
                        writes.remove(&lock);
                    }
                }
            }
        }
        er.retain(|_, by_lock| !by_lock.is_empty());
        ew.retain(|_, by_lock| !by_lock.is_empty());
    }
    er.remove(&tid);
    ew.remove(&tid);
    absorbed
}
