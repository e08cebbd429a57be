//! Relation Engine - One Causality Relation over the Event Stream
//!
//! # Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ RelationEngine                                                    │
//! ├───────────────────────────────────────────────────────────────────┤
//! │ threads:   DashMap<ThreadId, Arc<Mutex<ThreadContext>>>           │
//! │ live:      RwLock<Arc<[ThreadId]>>     Rule (b) fan-out           │
//! │ retired:   DashMap<ThreadId, u64>      last clock of joined tids  │
//! │ locks:     Registry<LockId, LockShadow>                           │
//! │ locations: Registry<LocationId, ShadowLocation>                   │
//! │ volatiles: Registry<LocationId, VolatileShadow>                   │
//! │ classes:   Registry<ClassId, ClassShadow>                          │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lock Order
//!
//! ```text
//! thread context  ->  lock state  ->  location meta
//!                                  ->  volatile / class clocks (leaves)
//! ```
//!
//! Two thread contexts are never held at once: fork and join copy the
//! clock they need out of one context before locking the other.

use super::counters::{Counters, EngineCounters};
use super::config::DetectorConfig;
use crate::domain::clock::{Epoch, EpochLayout, VectorClock};
use crate::domain::error::{DetectorError, DetectorResult};
use crate::domain::ids::{ClassId, LocationId, LockId, ThreadId};
use crate::domain::lock::{LockShadow, LockState, SyncContext};
use crate::domain::relation::{AnalysisMode, Relation};
use crate::domain::shadow::{machine, Conflict, FastPathOutcome, LocationMeta, ShadowLocation};
use crate::domain::thread::ThreadContext;
use crate::infrastructure::{Handle, Registry};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, trace};

/// Kind of plain access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    /// Read
    Read,
    /// Write
    Write,
}

impl AccessKind {
    #[inline(always)]
    const fn is_write(self) -> bool {
        matches!(self, AccessKind::Write)
    }
}

/// Volatile location modeled as an implicit lock
struct VolatileShadow {
    clocks: Mutex<VolatileClocks>,
}

struct VolatileClocks {
    write: VectorClock,
    reads_joined: VectorClock,
}

/// Class initialization clock
struct ClassShadow {
    init: RwLock<VectorClock>,
}

type SharedContext = Arc<Mutex<ThreadContext>>;

/// Shadow state and algorithms of one relation
pub struct RelationEngine {
    relation: Relation,
    mode: AnalysisMode,
    layout: EpochLayout,
    epoch_fast_path: bool,
    check_invariants: bool,
    threads: DashMap<ThreadId, SharedContext>,
    live: RwLock<Arc<[ThreadId]>>,
    retired: DashMap<ThreadId, u64>,
    locks: Registry<LockId, LockShadow>,
    locations: Registry<LocationId, ShadowLocation>,
    volatiles: Registry<LocationId, VolatileShadow>,
    classes: Registry<ClassId, ClassShadow>,
    counters: Option<Counters>,
}

impl RelationEngine {
    /// Engine for `relation` under `config`
    pub fn new(relation: Relation, config: &DetectorConfig) -> DetectorResult<Self> {
        let layout = config.layout()?;
        let mode = config.mode_for(relation);
        debug!(relation = relation.name(), ?mode, tid_bits = layout.tid_bits(), "relation engine ready");
        Ok(Self {
            relation,
            mode,
            layout,
            epoch_fast_path: config.epoch_fast_path,
            check_invariants: config.check_invariants,
            threads: DashMap::new(),
            live: RwLock::new(Arc::from(Vec::new())),
            retired: DashMap::new(),
            locks: Registry::new(),
            locations: Registry::new(),
            volatiles: Registry::new(),
            classes: Registry::new(),
            counters: config.count_events.then(Counters::default),
        })
    }

    /// Relation computed by this engine
    #[inline(always)]
    pub const fn relation(&self) -> Relation {
        self.relation
    }

    /// Analysis mode of this engine
    #[inline(always)]
    pub const fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// Epoch layout
    #[inline(always)]
    pub const fn layout(&self) -> EpochLayout {
        self.layout
    }

    /// Threads currently alive
    pub fn live_threads(&self) -> Arc<[ThreadId]> {
        self.live.read().clone()
    }

    /// Copy of a live thread's relation clock
    pub fn thread_clock(&self, tid: ThreadId) -> Option<VectorClock> {
        let ctx = self.threads.get(&tid).map(|c| Arc::clone(c.value()))?;
        let clock = ctx.lock().clock().clone();
        Some(clock)
    }

    /// Epoch a live thread's next access is stamped with
    pub fn access_epoch(&self, tid: ThreadId) -> Option<Epoch> {
        let ctx = self.threads.get(&tid).map(|c| Arc::clone(c.value()))?;
        let epoch = ctx.lock().access_epoch();
        Some(epoch)
    }

    /// Number of locations with shadow state
    pub fn tracked_locations(&self) -> usize {
        self.locations.len()
    }

    /// Number of locks with shadow state
    pub fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    /// Counter snapshot, when counting is enabled
    pub fn counters(&self) -> Option<EngineCounters> {
        self.counters.as_ref().map(|c| c.snapshot(self.relation))
    }

    #[inline]
    fn count(&self, pick: impl FnOnce(&Counters)) {
        if let Some(counters) = &self.counters {
            pick(counters);
        }
    }

    fn invariant(&self, holds: bool, what: impl FnOnce() -> String) -> DetectorResult<()> {
        if self.check_invariants && !holds {
            return Err(DetectorError::InvariantViolation(what()));
        }
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Threads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Context of `tid`, created on first sight
    ///
    /// A joined thread must be re-created explicitly.
    fn context(&self, tid: ThreadId) -> DetectorResult<SharedContext> {
        if let Some(ctx) = self.threads.get(&tid) {
            return Ok(Arc::clone(ctx.value()));
        }
        if self.retired.contains_key(&tid) {
            return Err(DetectorError::UnknownThread(tid));
        }
        self.spawn(tid).map(|(ctx, _)| ctx)
    }

    fn spawn(&self, tid: ThreadId) -> DetectorResult<(SharedContext, bool)> {
        self.layout.check_tid(tid)?;
        let seed = self.retired.get(&tid).map_or(0, |last| *last) + 1;
        let mut ctx = ThreadContext::new(tid, self.layout, seed, self.relation.tracks_hb_shadow());
        ctx.advance()?;

        let shared = match self.threads.entry(tid) {
            Entry::Occupied(existing) => return Ok((Arc::clone(existing.get()), false)),
            Entry::Vacant(vacant) => Arc::clone(vacant.insert(Arc::new(Mutex::new(ctx))).value()),
        };
        self.retired.remove(&tid);
        self.refresh_live();
        debug!(relation = self.relation.name(), %tid, seed, "thread created");
        Ok((shared, true))
    }

    fn refresh_live(&self) {
        let mut live: Vec<ThreadId> = self.threads.iter().map(|e| *e.key()).collect();
        live.sort_unstable();
        *self.live.write() = live.into();
    }

    /// `thread_create`
    pub fn thread_create(&self, tid: ThreadId) -> DetectorResult<()> {
        let (_, created) = self.spawn(tid)?;
        self.invariant(created, || format!("{tid} created twice"))
    }

    /// `fork`: the child starts after everything the parent did so far
    pub fn fork(&self, parent: ThreadId, child: ThreadId) -> DetectorResult<()> {
        self.invariant(parent != child, || format!("{parent} forks itself"))?;
        let parent_ctx = self.context(parent)?;
        let publish = parent_ctx.lock().publish_clock().clone();

        let child_ctx = self.context(child)?;
        child_ctx.lock().absorb_hard(&publish);

        parent_ctx.lock().advance()?;
        debug!(relation = self.relation.name(), %parent, %child, "fork");
        Ok(())
    }

    /// `join`: the parent continues after everything the child did
    pub fn join(&self, parent: ThreadId, child: ThreadId) -> DetectorResult<()> {
        self.invariant(parent != child, || format!("{parent} joins itself"))?;
        let parent_ctx = self.context(parent)?;
        let Some(child_ctx) = self.threads.get(&child).map(|c| Arc::clone(c.value())) else {
            return Err(DetectorError::UnknownThread(child));
        };

        let (publish, last) = {
            let ctx = child_ctx.lock();
            self.invariant(ctx.held().is_empty(), || format!("{child} joined while holding locks"))?;
            (ctx.publish_clock().clone(), ctx.final_clock())
        };
        self.threads.remove(&child);
        self.retired
            .entry(child)
            .and_modify(|c| *c = (*c).max(last))
            .or_insert(last);
        self.refresh_live();

        parent_ctx.lock().absorb_hard(&publish);
        debug!(relation = self.relation.name(), %parent, %child, last, "join");
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Locks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn lock_shadow(&self, id: LockId) -> Arc<LockShadow> {
        let (lock, created) = self.locks.get_or_insert_with(id, |handle| {
            LockShadow::new(id, handle, LockState::new(self.relation, self.layout))
        });
        if created {
            debug!(relation = self.relation.name(), lock = %id, "lock state created");
        }
        lock
    }

    fn with_sync<R>(&self, f: impl FnOnce(&SyncContext<'_>) -> R) -> R {
        let live = self.live_threads();
        let is_live = |h: Handle| self.locations.is_live(h);
        let sync = SyncContext {
            live: &live,
            mode: self.mode,
            reclaimed: self.locations.reclaimed(),
            is_live: &is_live,
        };
        f(&sync)
    }

    /// `acquire`
    pub fn acquire(&self, tid: ThreadId, id: LockId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let lock = self.lock_shadow(id);
        self.invariant(lock.holder().map_or(true, |h| h == tid), || {
            format!("{tid} acquires {id} held by {:?}", lock.holder())
        })?;
        if lock.enter(tid) > 1 {
            return Ok(());
        }
        let cm = self.with_sync(|sync| lock.state().on_acquire(&mut ctx, sync))?;
        ctx.push_held(lock, cm);
        self.count(|c| Counters::bump(&c.acquires));
        Ok(())
    }

    /// `release`
    pub fn release(&self, tid: ThreadId, id: LockId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let Some(lock) = self.locks.get(&id) else {
            return self.invariant(false, || format!("{tid} releases unknown {id}"));
        };
        self.invariant(lock.is_held_by(tid), || format!("{tid} releases {id} it does not hold"))?;
        if lock.depth() > 1 {
            lock.exit();
            return Ok(());
        }
        let drained = self.with_sync(|sync| lock.state().on_release(&mut ctx, sync))?;
        ctx.pop_held(&lock);
        lock.exit();
        self.count(|c| {
            Counters::bump(&c.releases);
            Counters::add(&c.rule_b_absorbed, drained as u64);
        });
        Ok(())
    }

    /// `wait`: release every hold on the monitor
    pub fn wait(&self, tid: ThreadId, id: LockId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let lock = self.lock_shadow(id);
        self.invariant(lock.is_held_by(tid), || format!("{tid} waits on {id} it does not hold"))?;
        let drained = self.with_sync(|sync| lock.state().on_wait(&mut ctx, sync))?;
        ctx.pop_held(&lock);
        let depth = lock.exit_all();
        ctx.begin_wait(lock.handle(), depth);
        self.count(|c| {
            Counters::bump(&c.releases);
            Counters::add(&c.rule_b_absorbed, drained as u64);
        });
        Ok(())
    }

    /// `wait_return`: hard re-acquire at the saved depth
    pub fn wait_return(&self, tid: ThreadId, id: LockId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let lock = self.lock_shadow(id);
        let depth = ctx.end_wait(lock.handle());
        self.invariant(depth.is_some(), || format!("{tid} returns from a wait on {id} it never began"))?;
        self.invariant(lock.holder().is_none(), || {
            format!("{tid} re-acquires {id} held by {:?}", lock.holder())
        })?;
        lock.reenter(tid, depth.unwrap_or(1));
        let cm = self.with_sync(|sync| lock.state().on_hard_acquire(&mut ctx, sync))?;
        ctx.push_held(lock, cm);
        self.count(|c| Counters::bump(&c.acquires));
        Ok(())
    }

    /// `notify`: no clock effect
    pub fn notify(&self, tid: ThreadId, id: LockId) -> DetectorResult<()> {
        let held = self.locks.get(&id).is_some_and(|lock| lock.is_held_by(tid));
        self.invariant(held, || format!("{tid} notifies {id} it does not hold"))
    }

    /// Host reclaimed a lock
    pub fn lock_freed(&self, id: LockId) {
        if self.locks.remove(&id).is_some() {
            trace!(relation = self.relation.name(), lock = %id, "lock state reclaimed");
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Volatiles and Classes
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn volatile(&self, id: LocationId) -> Arc<VolatileShadow> {
        let layout = self.layout;
        self.volatiles
            .get_or_insert_with(id, |_| VolatileShadow {
                clocks: Mutex::new(VolatileClocks {
                    write: VectorClock::new(layout),
                    reads_joined: VectorClock::new(layout),
                }),
            })
            .0
    }

    /// `volatile_read`: ordered after the last volatile write
    pub fn volatile_read(&self, tid: ThreadId, id: LocationId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let volatile = self.volatile(id);
        {
            let mut clocks = volatile.clocks.lock();
            ctx.absorb_hard(&clocks.write);
            clocks.reads_joined.max(ctx.publish_clock());
        }
        self.count(|c| Counters::bump(&c.volatile_accesses));
        ctx.advance()
    }

    /// `volatile_write`: ordered after every prior volatile access
    pub fn volatile_write(&self, tid: ThreadId, id: LocationId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let volatile = self.volatile(id);
        {
            let mut clocks = volatile.clocks.lock();
            ctx.absorb_hard(&clocks.reads_joined);
            ctx.absorb_hard(&clocks.write);
            clocks.write.max(ctx.publish_clock());
        }
        self.count(|c| Counters::bump(&c.volatile_accesses));
        ctx.advance()
    }

    /// `class_init`
    pub fn class_init(&self, tid: ThreadId, id: ClassId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        let layout = self.layout;
        let (class, _) = self.classes.get_or_insert_with(id, |_| ClassShadow {
            init: RwLock::new(VectorClock::new(layout)),
        });
        class.init.write().max(ctx.publish_clock());
        ctx.advance()
    }

    /// `class_access`
    pub fn class_access(&self, tid: ThreadId, id: ClassId) -> DetectorResult<()> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        self.absorb_class(&mut ctx, id);
        Ok(())
    }

    fn absorb_class(&self, ctx: &mut ThreadContext, id: ClassId) {
        if let Some(class) = self.classes.get(&id) {
            ctx.absorb_hard(&class.init.read());
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Accesses
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Plain access to `id`; returns the conflict this relation finds
    ///
    /// `owner` names the class of a static field: its initialization is
    /// absorbed before the access.
    pub fn access(
        &self,
        tid: ThreadId,
        id: LocationId,
        kind: AccessKind,
        owner: Option<ClassId>,
    ) -> DetectorResult<Option<Conflict>> {
        let ctx = self.context(tid)?;
        let mut ctx = ctx.lock();
        if let Some(class) = owner {
            self.absorb_class(&mut ctx, class);
        }
        let e = ctx.access_epoch();

        let (loc, created) = self
            .locations
            .get_or_insert_with(id, |handle| self.first_access(id, handle, &ctx, kind, e));
        if created {
            self.note_first_access(&ctx, loc.handle(), kind);
            self.count(|c| Counters::bump(&c.first_accesses));
            trace!(relation = self.relation.name(), %tid, loc = %id, ?kind, "first access");
            return Ok(None);
        }

        let handle = if self.epoch_fast_path {
            let outcome = match kind {
                AccessKind::Read => loc.try_fast_read(tid, e),
                AccessKind::Write => loc.try_fast_write(e),
            };
            match outcome {
                FastPathOutcome::Resolved => {
                    self.count(|c| Counters::bump(&c.fast_path_hits));
                    return Ok(None);
                }
                FastPathOutcome::NeedsSlowPath(handle) => handle,
            }
        } else {
            loc.handle()
        };
        self.count(|c| Counters::bump(&c.slow_path_entries));

        if self.relation.uses_rule_a() {
            match self.mode {
                AnalysisMode::Plain => self.apply_rule_a(&mut ctx, handle, kind),
                AnalysisMode::Owned => {
                    let same_epoch = match kind {
                        AccessKind::Read => loc.same_epoch_read(tid, e),
                        AccessKind::Write => loc.same_epoch_write(e),
                    };
                    if !same_epoch {
                        self.apply_rule_a(&mut ctx, handle, kind);
                    }
                }
                AnalysisMode::Snapshot => {}
            }
        }

        let step = {
            let mut meta = loc.lock();
            match kind {
                AccessKind::Read => machine::read(&loc, &mut meta, &mut ctx, self.mode),
                AccessKind::Write => machine::write(&loc, &mut meta, &mut ctx, self.mode),
            }
        };
        self.count(|c| c.transition(step.transition));
        trace!(
            relation = self.relation.name(),
            %tid,
            loc = %id,
            transition = step.transition.name(),
            race = step.conflict.is_some(),
            "slow path"
        );
        if step.conflict.is_some() {
            self.count(|c| Counters::bump(&c.races));
        }
        Ok(step.conflict)
    }

    /// Shadow state of a location at its first access
    fn first_access(
        &self,
        id: LocationId,
        handle: Handle,
        ctx: &ThreadContext,
        kind: AccessKind,
        e: Epoch,
    ) -> ShadowLocation {
        let owned = self.mode.tracks_ownership();
        let (w, r) = match kind {
            AccessKind::Read => (Epoch::ZERO, e),
            AccessKind::Write if owned => (e, e),
            AccessKind::Write => (e, Epoch::ZERO),
        };
        let mut meta = LocationMeta::default();
        if self.mode == AnalysisMode::Snapshot {
            let held = ctx.snapshots();
            if kind.is_write() {
                meta.wm.clone_from(&held);
            }
            meta.rm = held;
        }
        ShadowLocation::new(id, handle, w, r, VectorClock::new(self.layout), meta)
    }

    /// Enter a new location into the critical sections of the held locks
    fn note_first_access(&self, ctx: &ThreadContext, loc: Handle, kind: AccessKind) {
        if !self.relation.uses_rule_a() || self.mode == AnalysisMode::Snapshot {
            return;
        }
        let both = self.mode == AnalysisMode::Owned && kind.is_write();
        for held in ctx.held() {
            let mut state = held.lock.state();
            if let Some(maps) = state.rule_a() {
                if both || !kind.is_write() {
                    maps.note_read(loc);
                }
                if kind.is_write() {
                    maps.note_write(loc);
                }
            }
        }
    }

    /// Rule (a) for every held lock, then join the current critical sections
    ///
    /// Plain mode walks innermost to outermost, owned mode outermost first.
    fn apply_rule_a(&self, ctx: &mut ThreadContext, loc: Handle, kind: AccessKind) {
        let mut locks = ctx.held_locks();
        if locks.is_empty() {
            return;
        }
        if self.mode == AnalysisMode::Plain {
            locks.reverse();
        }
        let owned = self.mode.tracks_ownership();
        for lock in locks {
            let mut state = lock.state();
            let Some(maps) = state.rule_a() else {
                continue;
            };
            if let Some(prior) = maps.last_write(loc) {
                ctx.absorb(prior);
            }
            match kind {
                AccessKind::Read => maps.note_read(loc),
                AccessKind::Write => {
                    if let Some(prior) = maps.last_read(loc) {
                        ctx.absorb(prior);
                    }
                    if owned {
                        maps.note_read(loc);
                    }
                    maps.note_write(loc);
                }
            }
        }
    }

    /// Host reclaimed a memory location
    pub fn location_freed(&self, id: LocationId) {
        let plain = self.locations.remove(&id).is_some();
        let volatile = self.volatiles.remove(&id).is_some();
        if plain || volatile {
            trace!(relation = self.relation.name(), loc = %id, "location state reclaimed");
        }
    }

    /// Held locks of a live thread, outermost first
    pub fn held_locks(&self, tid: ThreadId) -> SmallVec<[LockId; 4]> {
        self.threads
            .get(&tid)
            .map(|ctx| Arc::clone(ctx.value()))
            .map(|ctx| ctx.lock().held().iter().map(|h| h.lock.id()).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for RelationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationEngine")
            .field("relation", &self.relation)
            .field("mode", &self.mode)
            .field("threads", &self.threads.len())
            .field("locations", &self.locations.len())
            .field("locks", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shadow::RaceKind;

    fn engine(relation: Relation, config: DetectorConfig) -> RelationEngine {
        RelationEngine::new(relation, &config.with_max_threads(8).with_count_events(true)).unwrap()
    }

    fn t(n: u32) -> ThreadId {
        ThreadId(n)
    }

    #[test]
    fn test_unsynchronized_writes_race() {
        let e = engine(Relation::Hb, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        assert_eq!(e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap(), None);
        let conflict = e.access(t(1), LocationId(1), AccessKind::Write, None).unwrap();
        assert_eq!(
            conflict,
            Some(Conflict {
                kind: RaceKind::WriteWrite,
                prior: t(0)
            })
        );
    }

    #[test]
    fn test_fork_and_join_order() {
        let e = engine(Relation::Wcp, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap();
        e.fork(t(0), t(1)).unwrap();
        assert_eq!(e.access(t(1), LocationId(1), AccessKind::Write, None).unwrap(), None);
        e.join(t(0), t(1)).unwrap();
        assert_eq!(e.access(t(0), LocationId(1), AccessKind::Read, None).unwrap(), None);
        assert_eq!(&*e.live_threads(), &[t(0)]);
    }

    #[test]
    fn test_joined_thread_is_unknown_until_recreated() {
        let e = engine(Relation::Dc, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.fork(t(0), t(1)).unwrap();
        let before = e.layout().clock(e.access_epoch(t(1)).unwrap());
        e.join(t(0), t(1)).unwrap();
        assert_eq!(
            e.acquire(t(1), LockId(1)),
            Err(DetectorError::UnknownThread(t(1)))
        );
        e.thread_create(t(1)).unwrap();
        let after = e.layout().clock(e.access_epoch(t(1)).unwrap());
        assert!(after > before);
    }

    #[test]
    fn test_failed_join_leaves_child_live() {
        let e = engine(Relation::Wcp, DetectorConfig::default().with_check_invariants(true));
        e.thread_create(t(0)).unwrap();
        e.fork(t(0), t(1)).unwrap();
        e.acquire(t(1), LockId(3)).unwrap();
        assert!(matches!(
            e.join(t(0), t(1)),
            Err(DetectorError::InvariantViolation(_))
        ));
        assert_eq!(&*e.live_threads(), &[t(0), t(1)]);
        assert!(e.thread_clock(t(1)).is_some());

        e.release(t(1), LockId(3)).unwrap();
        e.join(t(0), t(1)).unwrap();
        assert_eq!(&*e.live_threads(), &[t(0)]);
    }

    #[test]
    fn test_reentrant_acquire_is_counted_once() {
        let e = engine(Relation::Wdc, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.acquire(t(0), LockId(5)).unwrap();
        e.acquire(t(0), LockId(5)).unwrap();
        e.release(t(0), LockId(5)).unwrap();
        assert_eq!(e.held_locks(t(0)).as_slice(), &[LockId(5)]);
        e.release(t(0), LockId(5)).unwrap();
        assert!(e.held_locks(t(0)).is_empty());
        let counters = e.counters().unwrap();
        assert_eq!((counters.acquires, counters.releases), (1, 1));
    }

    #[test]
    fn test_wait_releases_all_holds() {
        let e = engine(Relation::Hb, DetectorConfig::default().with_check_invariants(true));
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        e.acquire(t(0), LockId(2)).unwrap();
        e.acquire(t(0), LockId(2)).unwrap();
        e.access(t(0), LocationId(9), AccessKind::Write, None).unwrap();
        e.wait(t(0), LockId(2)).unwrap();

        e.acquire(t(1), LockId(2)).unwrap();
        assert_eq!(e.access(t(1), LocationId(9), AccessKind::Write, None).unwrap(), None);
        e.notify(t(1), LockId(2)).unwrap();
        e.release(t(1), LockId(2)).unwrap();

        e.wait_return(t(0), LockId(2)).unwrap();
        e.release(t(0), LockId(2)).unwrap();
        assert_eq!(e.held_locks(t(0)).as_slice(), &[LockId(2)]);
        e.release(t(0), LockId(2)).unwrap();
        assert!(e.held_locks(t(0)).is_empty());
    }

    #[test]
    fn test_invariant_checks() {
        let e = engine(Relation::Hb, DetectorConfig::default().with_check_invariants(true));
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        assert!(matches!(
            e.release(t(0), LockId(1)),
            Err(DetectorError::InvariantViolation(_))
        ));
        e.acquire(t(0), LockId(1)).unwrap();
        assert!(matches!(
            e.acquire(t(1), LockId(1)),
            Err(DetectorError::InvariantViolation(_))
        ));
        assert!(matches!(
            e.notify(t(1), LockId(1)),
            Err(DetectorError::InvariantViolation(_))
        ));
        assert!(matches!(
            e.thread_create(t(0)),
            Err(DetectorError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_volatile_orders_accesses() {
        let e = engine(Relation::Wdc, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap();
        e.volatile_write(t(0), LocationId(50)).unwrap();
        e.volatile_read(t(1), LocationId(50)).unwrap();
        assert_eq!(e.access(t(1), LocationId(1), AccessKind::Read, None).unwrap(), None);
    }

    #[test]
    fn test_class_init_orders_static_access() {
        let e = engine(Relation::Dc, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap();
        e.class_init(t(0), ClassId(3)).unwrap();
        let conflict = e
            .access(t(1), LocationId(1), AccessKind::Read, Some(ClassId(3)))
            .unwrap();
        assert_eq!(conflict, None);
    }

    #[test]
    fn test_fast_path_counts() {
        let e = engine(Relation::Hb, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Read, None).unwrap();
        let counters = e.counters().unwrap();
        assert_eq!(counters.first_accesses, 1);
        assert_eq!(counters.fast_path_hits, 2);
        assert_eq!(counters.slow_path_entries, 0);
    }

    #[test]
    fn test_slow_path_applies_rule_a_after_fast_path_miss() {
        let e = engine(Relation::Wcp, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        e.acquire(t(0), LockId(1)).unwrap();
        e.access(t(0), LocationId(4), AccessKind::Write, None).unwrap();
        e.release(t(0), LockId(1)).unwrap();
        e.acquire(t(1), LockId(1)).unwrap();
        assert_eq!(e.access(t(1), LocationId(4), AccessKind::Write, None).unwrap(), None);
        e.release(t(1), LockId(1)).unwrap();
        assert_eq!(e.counters().unwrap().slow_path_entries, 1);
    }

    #[test]
    fn test_freed_location_starts_fresh() {
        let e = engine(Relation::Hb, DetectorConfig::default());
        e.thread_create(t(0)).unwrap();
        e.thread_create(t(1)).unwrap();
        e.access(t(0), LocationId(1), AccessKind::Write, None).unwrap();
        e.location_freed(LocationId(1));
        assert_eq!(e.tracked_locations(), 0);
        assert_eq!(e.access(t(1), LocationId(1), AccessKind::Write, None).unwrap(), None);
    }
}
