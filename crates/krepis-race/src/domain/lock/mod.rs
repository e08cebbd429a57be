//! Lock Module - Lock Shadow State and Critical-Section Propagation
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ LockShadow (one per lock, per relation engine)               │
//! ├──────────────────────────────────────────────────────────────┤
//! │ holder: AtomicU32      read lock-free by snapshot walks      │
//! │ depth:  AtomicU32      re-entrant hold count                 │
//! │ state:  Mutex<LockState>                                     │
//! │   ├─ Hb  { clock }                                           │
//! │   ├─ Wcp { clock, hb, RuleBQueues<Fifo>, RuleAMaps, Cm }     │
//! │   ├─ Dc  { clock, RuleBQueues<PerSourceFifo>, RuleAMaps, Cm }│
//! │   └─ Wdc { clock, RuleAMaps, Cm }                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The state mutex is mutated only while the program thread holds the real
//! lock, so it is effectively uncontended. It sits between the thread context
//! and the location shadow in the detector's lock order.

pub mod queue;
pub mod rule_a;
pub mod state;

pub use queue::{Fifo, PerSourceFifo, RuleBQueues, SnapshotQueue};
pub use rule_a::{should_shrink, RuleAMaps};
pub use state::{DcLock, HbLock, LockState, SyncContext, WcpLock, WdcLock};

use crate::domain::ids::{LockId, ThreadId};
use crate::infrastructure::Handle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

const NO_HOLDER: u32 = u32::MAX;

/// Shadow of one lock under one relation
pub struct LockShadow {
    id: LockId,
    handle: Handle,
    holder: AtomicU32,
    depth: AtomicU32,
    state: Mutex<LockState>,
}

impl LockShadow {
    /// Unheld lock with fresh relation state
    pub fn new(id: LockId, handle: Handle, state: LockState) -> Self {
        Self {
            id,
            handle,
            holder: AtomicU32::new(NO_HOLDER),
            depth: AtomicU32::new(0),
            state: Mutex::new(state),
        }
    }

    /// Host identity
    #[inline(always)]
    pub const fn id(&self) -> LockId {
        self.id
    }

    /// Arena handle
    #[inline(always)]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Current holder
    #[inline]
    pub fn holder(&self) -> Option<ThreadId> {
        match self.holder.load(Ordering::Acquire) {
            NO_HOLDER => None,
            tid => Some(ThreadId(tid)),
        }
    }

    /// Whether `tid` currently holds the lock
    #[inline]
    pub fn is_held_by(&self, tid: ThreadId) -> bool {
        self.holder.load(Ordering::Acquire) == tid.0
    }

    /// Current hold depth (0 when free)
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }

    /// Record an acquire; returns the new hold depth
    pub fn enter(&self, tid: ThreadId) -> u32 {
        if self.is_held_by(tid) {
            return self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.holder.store(tid.0, Ordering::Release);
        self.depth.store(1, Ordering::Relaxed);
        1
    }

    /// Record a release; returns the remaining hold depth
    pub fn exit(&self) -> u32 {
        let depth = self.depth.load(Ordering::Relaxed).saturating_sub(1);
        self.depth.store(depth, Ordering::Relaxed);
        if depth == 0 {
            self.holder.store(NO_HOLDER, Ordering::Release);
        }
        depth
    }

    /// Drop every hold at once (wait); returns the depth to restore later
    pub fn exit_all(&self) -> u32 {
        let depth = self.depth.swap(0, Ordering::Relaxed);
        self.holder.store(NO_HOLDER, Ordering::Release);
        depth
    }

    /// Re-take the lock at a saved depth (wait return)
    pub fn reenter(&self, tid: ThreadId, depth: u32) {
        self.holder.store(tid.0, Ordering::Release);
        self.depth.store(depth.max(1), Ordering::Relaxed);
    }

    /// Exclusive access to the relation state
    #[inline]
    pub fn state(&self) -> parking_lot::MutexGuard<'_, LockState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for LockShadow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockShadow")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("holder", &self.holder())
            .finish()
    }
}
