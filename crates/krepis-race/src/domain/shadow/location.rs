//! Shadow Location - Per-Memory-Location Access History
//!
//! # Layout
//!
//! ```text
//! ShadowLocation
//!   ├─ w: AtomicU64                 last write epoch
//!   ├─ r: AtomicU64                 last read epoch, or READ_SHARED
//!   ├─ readers: RwLock<VectorClock> per-thread last reads while shared
//!   └─ meta: Mutex<LocationMeta>    the location lock + snapshot bookkeeping
//! ```
//!
//! `w`, `r` and `readers` are written only while `meta` is held. The fast
//! path reads them without taking `meta`; a stale value can only make it
//! answer "needs slow path", never "no race".
//!
//! # Fast Path
//!
//! ```text
//! read:   R == E  ||  W == E  ||  (R == SHARED && readers[t] == E)
//! write:  W == E
//! ```
//!
//! The shared-read probe re-loads `R` after reading the slot, so a
//! concurrent transition out of (and back into) shared state is detected.

use super::snapshot::{DeferredSnapshots, SnapshotList};
use crate::domain::clock::{Epoch, VectorClock};
use crate::domain::ids::{LocationId, ThreadId};
use crate::infrastructure::Handle;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of the lock-free same-epoch probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FastPathOutcome {
    /// Same-epoch access: race-free, nothing to update
    Resolved,
    /// Analysis must continue under the location lock
    NeedsSlowPath(Handle),
}

/// Snapshot-mode bookkeeping, guarded by the location lock
#[derive(Debug, Default)]
pub struct LocationMeta {
    /// Held-lock list of the last read (epoch state)
    pub rm: Option<SnapshotList>,
    /// Held-lock list of the last write
    pub wm: Option<SnapshotList>,
    /// Held-lock list per shared reader
    pub shared_rm: HashMap<ThreadId, Option<SnapshotList>>,
    /// Undecided prior-read snapshots
    pub er: DeferredSnapshots,
    /// Undecided prior-write snapshots
    pub ew: DeferredSnapshots,
}

/// Shadow state of one memory location
pub struct ShadowLocation {
    id: LocationId,
    handle: Handle,
    w: AtomicU64,
    r: AtomicU64,
    readers: RwLock<VectorClock>,
    meta: Mutex<LocationMeta>,
}

impl ShadowLocation {
    /// Location created by its first access
    pub fn new(id: LocationId, handle: Handle, w: Epoch, r: Epoch, readers: VectorClock, meta: LocationMeta) -> Self {
        Self {
            id,
            handle,
            w: AtomicU64::new(w.to_raw()),
            r: AtomicU64::new(r.to_raw()),
            readers: RwLock::new(readers),
            meta: Mutex::new(meta),
        }
    }

    /// Host identity
    #[inline(always)]
    pub const fn id(&self) -> LocationId {
        self.id
    }

    /// Arena handle
    #[inline(always)]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Last write epoch
    #[inline(always)]
    pub fn w(&self) -> Epoch {
        Epoch::from_raw(self.w.load(Ordering::Acquire))
    }

    /// Last read epoch or [`Epoch::READ_SHARED`]
    #[inline(always)]
    pub fn r(&self) -> Epoch {
        Epoch::from_raw(self.r.load(Ordering::Acquire))
    }

    /// Shared reader slot of `tid`
    #[inline]
    pub fn reader(&self, tid: ThreadId) -> Epoch {
        self.readers.read().get(tid)
    }

    /// Shared reader vector
    #[inline]
    pub fn readers(&self) -> RwLockReadGuard<'_, VectorClock> {
        self.readers.read()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Fast Path
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Lock-free same-epoch probe for a read at `e` by `tid`
    #[inline]
    pub fn try_fast_read(&self, tid: ThreadId, e: Epoch) -> FastPathOutcome {
        let r = self.r();
        if r == e || self.w() == e {
            return FastPathOutcome::Resolved;
        }
        if r.is_read_shared() {
            if let Some(readers) = self.readers.try_read() {
                let mine = readers.get(tid);
                drop(readers);
                if mine == e && self.r().is_read_shared() {
                    return FastPathOutcome::Resolved;
                }
            }
        }
        FastPathOutcome::NeedsSlowPath(self.handle)
    }

    /// Lock-free same-epoch probe for a write at `e`
    #[inline]
    pub fn try_fast_write(&self, e: Epoch) -> FastPathOutcome {
        if self.w() == e {
            FastPathOutcome::Resolved
        } else {
            FastPathOutcome::NeedsSlowPath(self.handle)
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Slow Path (caller holds the location lock)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Take the location lock
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, LocationMeta> {
        self.meta.lock()
    }

    /// Same-epoch check under the lock (same answer as the fast path)
    pub fn same_epoch_read(&self, tid: ThreadId, e: Epoch) -> bool {
        let r = self.r();
        r == e || self.w() == e || (r.is_read_shared() && self.reader(tid) == e)
    }

    /// Same-epoch check under the lock for a write
    pub fn same_epoch_write(&self, e: Epoch) -> bool {
        self.w() == e
    }

    pub(crate) fn set_w(&self, e: Epoch) {
        self.w.store(e.to_raw(), Ordering::Release);
    }

    pub(crate) fn set_r(&self, e: Epoch) {
        self.r.store(e.to_raw(), Ordering::Release);
    }

    pub(crate) fn set_reader(&self, tid: ThreadId, e: Epoch) {
        self.readers.write().set(tid, e);
    }

    /// Widen to shared: reset the vector, record both readers, then publish
    pub(crate) fn share(&self, prior: Epoch, current: Epoch) {
        {
            let mut readers = self.readers.write();
            let layout = readers.layout();
            readers.clear();
            readers.set(layout.tid(prior), prior);
            readers.set(layout.tid(current), current);
        }
        self.set_r(Epoch::READ_SHARED);
    }

    /// Write collapse: `W = R = e`
    pub(crate) fn collapse(&self, e: Epoch) {
        self.set_w(e);
        self.set_r(e);
    }
}

impl std::fmt::Debug for ShadowLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowLocation")
            .field("id", &self.id)
            .field("w", &self.w())
            .field("r", &self.r())
            .finish()
    }
}
