//! Per-Relation Lock State
//!
//! One variant per relation, holding only what that relation needs.
//!
//! | Relation | acquire                         | release                                   |
//! |----------|---------------------------------|-------------------------------------------|
//! | HB       | `V ⊔= L`                        | `L ⊔= V`, tick                            |
//! | WCP      | `H ⊔= L.hb`, `V ⊔= L`, enqueue  | drain, Rule (a), `L.hb ⊔= H`, `L ⊔= V`    |
//! | DC       | enqueue, tick                   | drain, Rule (a), `L ⊔= V`, enqueue, tick  |
//! | WDC      | tick                            | Rule (a), `L ⊔= V`, tick                  |
//!
//! In snapshot mode every non-HB acquire also opens a fresh critical-section
//! clock `Cm` whose own slot is `(tid, MAX_CLOCK)` until the release copies
//! the publishing clock into it.

use super::queue::{Fifo, PerSourceFifo, RuleBQueues};
use super::rule_a::RuleAMaps;
use crate::domain::clock::{EpochLayout, VectorClock};
use crate::domain::error::DetectorResult;
use crate::domain::ids::ThreadId;
use crate::domain::relation::{AnalysisMode, Relation};
use crate::domain::thread::{SharedClock, ThreadContext};
use crate::infrastructure::Handle;
use parking_lot::RwLock;
use std::sync::Arc;

/// Engine-wide facts a lock operation needs
pub struct SyncContext<'a> {
    /// Threads currently alive in the engine
    pub live: &'a [ThreadId],
    /// Analysis mode of the engine
    pub mode: AnalysisMode,
    /// Reclamation counter of the location arena
    pub reclaimed: u64,
    /// Whether a location handle is still live
    pub is_live: &'a dyn Fn(Handle) -> bool,
}

impl SyncContext<'_> {
    #[inline]
    fn snapshots(&self) -> bool {
        self.mode == AnalysisMode::Snapshot
    }
}

/// HB lock: last-release clock
#[derive(Debug)]
pub struct HbLock {
    /// Clock of the most recent release
    pub clock: VectorClock,
}

/// WCP lock
#[derive(Debug)]
pub struct WcpLock {
    /// WCP clock of the most recent release
    pub clock: VectorClock,
    /// HB clock of the most recent release
    pub hb: VectorClock,
    /// Rule (b) queues
    pub queues: RuleBQueues<Fifo>,
    /// Rule (a) maps
    pub rule_a: RuleAMaps,
    /// Current critical-section clock (snapshot mode)
    pub current: Option<SharedClock>,
}

/// DC lock
#[derive(Debug)]
pub struct DcLock {
    /// Clock of the most recent release (hard edges only)
    pub clock: VectorClock,
    /// Rule (b) queues keyed by source thread
    pub queues: RuleBQueues<PerSourceFifo>,
    /// Rule (a) maps
    pub rule_a: RuleAMaps,
    /// Current critical-section clock (snapshot mode)
    pub current: Option<SharedClock>,
}

/// WDC lock
#[derive(Debug)]
pub struct WdcLock {
    /// Clock of the most recent release (hard edges only)
    pub clock: VectorClock,
    /// Rule (a) maps
    pub rule_a: RuleAMaps,
    /// Current critical-section clock (snapshot mode)
    pub current: Option<SharedClock>,
}

/// Relation-tagged lock state
#[derive(Debug)]
pub enum LockState {
    /// Happens-Before
    Hb(HbLock),
    /// Weak-Causally-Precedes
    Wcp(WcpLock),
    /// Doesn't-Commute
    Dc(DcLock),
    /// Weak-Doesn't-Commute
    Wdc(WdcLock),
}

fn open_critical_section(tid: ThreadId, layout: EpochLayout) -> SharedClock {
    let mut cm = VectorClock::new(layout);
    cm.set(tid, layout.make(tid, layout.max_clock()));
    Arc::new(RwLock::new(cm))
}

fn close_critical_section(current: &Option<SharedClock>, publish: &VectorClock) {
    if let Some(cm) = current {
        cm.write().copy_from(publish);
    }
}

impl LockState {
    /// Fresh state for `relation`
    pub fn new(relation: Relation, layout: EpochLayout) -> Self {
        let clock = VectorClock::new(layout);
        match relation {
            Relation::Hb => LockState::Hb(HbLock { clock }),
            Relation::Wcp => LockState::Wcp(WcpLock {
                hb: VectorClock::new(layout),
                clock,
                queues: RuleBQueues::new(),
                rule_a: RuleAMaps::new(),
                current: None,
            }),
            Relation::Dc => LockState::Dc(DcLock {
                clock,
                queues: RuleBQueues::new(),
                rule_a: RuleAMaps::new(),
                current: None,
            }),
            Relation::Wdc => LockState::Wdc(WdcLock {
                clock,
                rule_a: RuleAMaps::new(),
                current: None,
            }),
        }
    }

    /// Relation this state belongs to
    pub const fn relation(&self) -> Relation {
        match self {
            LockState::Hb(_) => Relation::Hb,
            LockState::Wcp(_) => Relation::Wcp,
            LockState::Dc(_) => Relation::Dc,
            LockState::Wdc(_) => Relation::Wdc,
        }
    }

    /// Aggregate release clock
    pub fn clock(&self) -> &VectorClock {
        match self {
            LockState::Hb(s) => &s.clock,
            LockState::Wcp(s) => &s.clock,
            LockState::Dc(s) => &s.clock,
            LockState::Wdc(s) => &s.clock,
        }
    }

    /// Rule (a) maps (None for HB)
    pub fn rule_a(&mut self) -> Option<&mut RuleAMaps> {
        match self {
            LockState::Hb(_) => None,
            LockState::Wcp(s) => Some(&mut s.rule_a),
            LockState::Dc(s) => Some(&mut s.rule_a),
            LockState::Wdc(s) => Some(&mut s.rule_a),
        }
    }

    /// Snapshots queued for `td` by Rule (b)
    pub fn pending_rule_b(&self, td: ThreadId) -> usize {
        match self {
            LockState::Wcp(s) => s.queues.pending(td),
            LockState::Dc(s) => s.queues.pending(td),
            LockState::Hb(_) | LockState::Wdc(_) => 0,
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Acquire
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Outermost acquire by `ctx`
    ///
    /// Returns the critical-section clock opened in snapshot mode.
    pub fn on_acquire(
        &mut self,
        ctx: &mut ThreadContext,
        sync: &SyncContext<'_>,
    ) -> DetectorResult<Option<SharedClock>> {
        match self {
            LockState::Hb(s) => ctx.absorb(&s.clock),
            LockState::Wcp(s) => {
                ctx.absorb_hb(&s.hb);
                ctx.absorb(&s.clock);
            }
            LockState::Dc(_) | LockState::Wdc(_) => {}
        }
        self.finish_acquire(ctx, sync)
    }

    /// Acquire on wake-up from `wait`: joins the full hard-edge clock
    pub fn on_hard_acquire(
        &mut self,
        ctx: &mut ThreadContext,
        sync: &SyncContext<'_>,
    ) -> DetectorResult<Option<SharedClock>> {
        match self {
            LockState::Wcp(s) => ctx.absorb_hard(&s.hb),
            LockState::Hb(HbLock { clock })
            | LockState::Dc(DcLock { clock, .. })
            | LockState::Wdc(WdcLock { clock, .. }) => ctx.absorb(clock),
        }
        self.finish_acquire(ctx, sync)
    }

    fn finish_acquire(
        &mut self,
        ctx: &mut ThreadContext,
        sync: &SyncContext<'_>,
    ) -> DetectorResult<Option<SharedClock>> {
        let tid = ctx.tid();
        let opened = sync
            .snapshots()
            .then(|| open_critical_section(tid, ctx.layout()));
        match self {
            LockState::Hb(_) => {}
            LockState::Wcp(s) => {
                s.queues
                    .enqueue_acquire(tid, ctx.program_order_union(), sync.live);
                s.current.clone_from(&opened);
            }
            LockState::Dc(s) => {
                s.queues.enqueue_acquire(tid, ctx.clock().clone(), sync.live);
                s.current.clone_from(&opened);
            }
            LockState::Wdc(s) => s.current.clone_from(&opened),
        }
        ctx.advance()?;
        Ok(opened)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Release
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Outermost release by `ctx`
    ///
    /// Returns the number of Rule (b) pairs absorbed.
    pub fn on_release(&mut self, ctx: &mut ThreadContext, sync: &SyncContext<'_>) -> DetectorResult<usize> {
        let tid = ctx.tid();
        let mut drained = 0;
        match self {
            LockState::Hb(s) => s.clock.copy_from(ctx.clock()),
            LockState::Wcp(s) => {
                let union = ctx.program_order_union();
                for rel in s.queues.drain_ordered(tid, &union) {
                    ctx.absorb(&rel);
                    drained += 1;
                }
                publish_rule_a(&mut s.rule_a, &s.current, ctx.publish_clock(), sync);
                s.hb.copy_from(ctx.publish_clock());
                s.clock.copy_from(ctx.clock());
                s.queues
                    .enqueue_release(tid, ctx.publish_clock().clone(), sync.live);
                s.queues.retain_live(sync.live);
            }
            LockState::Dc(s) => {
                for &source in sync.live {
                    if source != tid {
                        drained += s.queues.drain_from(source, ctx);
                    }
                }
                publish_rule_a(&mut s.rule_a, &s.current, ctx.clock(), sync);
                s.clock.copy_from(ctx.clock());
                s.queues.enqueue_release(tid, ctx.clock().clone(), sync.live);
                s.queues.retain_live(sync.live);
            }
            LockState::Wdc(s) => {
                publish_rule_a(&mut s.rule_a, &s.current, ctx.clock(), sync);
                s.clock.copy_from(ctx.clock());
            }
        }
        ctx.advance()?;
        Ok(drained)
    }

    /// Pre-wait half of `wait`: the monitor is released
    pub fn on_wait(&mut self, ctx: &mut ThreadContext, sync: &SyncContext<'_>) -> DetectorResult<usize> {
        match self {
            LockState::Hb(s) => {
                s.clock.copy_from(ctx.clock());
                ctx.advance()?;
                Ok(0)
            }
            _ => self.on_release(ctx, sync),
        }
    }
}

fn publish_rule_a(
    rule_a: &mut RuleAMaps,
    current: &Option<SharedClock>,
    publish: &VectorClock,
    sync: &SyncContext<'_>,
) {
    rule_a.purge(sync.reclaimed, sync.is_live);
    if sync.snapshots() {
        close_critical_section(current, publish);
    } else {
        rule_a.publish(publish);
    }
    rule_a.reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> EpochLayout {
        EpochLayout::for_max_threads(8).unwrap()
    }

    fn always_live(_: Handle) -> bool {
        true
    }

    fn sync<'a>(live: &'a [ThreadId], mode: AnalysisMode) -> SyncContext<'a> {
        SyncContext {
            live,
            mode,
            reclaimed: 0,
            is_live: &always_live,
        }
    }

    fn clock_of(ctx: &ThreadContext, tid: u32) -> u64 {
        layout().clock(ctx.knows(ThreadId(tid)))
    }

    #[test]
    fn test_hb_release_then_acquire_orders() {
        let live = [ThreadId(0), ThreadId(1)];
        let s = sync(&live, AnalysisMode::Plain);
        let mut lock = LockState::new(Relation::Hb, layout());
        let mut a = ThreadContext::new(ThreadId(0), layout(), 2, false);
        let mut b = ThreadContext::new(ThreadId(1), layout(), 2, false);

        lock.on_acquire(&mut a, &s).unwrap();
        assert_eq!(clock_of(&a, 0), 3);
        lock.on_release(&mut a, &s).unwrap();
        assert_eq!(clock_of(&a, 0), 4);

        lock.on_acquire(&mut b, &s).unwrap();
        assert_eq!(clock_of(&b, 0), 3);
        assert_eq!(clock_of(&b, 1), 3);
    }

    #[test]
    fn test_hard_acquire_joins_hb_lock_clock() {
        let live = [ThreadId(0), ThreadId(1)];
        let s = sync(&live, AnalysisMode::Plain);
        let mut lock = LockState::new(Relation::Hb, layout());
        let mut a = ThreadContext::new(ThreadId(0), layout(), 2, false);
        let mut b = ThreadContext::new(ThreadId(1), layout(), 2, false);

        lock.on_acquire(&mut a, &s).unwrap();
        lock.on_wait(&mut a, &s).unwrap();
        lock.on_hard_acquire(&mut b, &s).unwrap();
        assert_eq!(clock_of(&b, 0), 3);
    }

    #[test]
    fn test_release_keeps_only_latest_clock() {
        let live = [ThreadId(0), ThreadId(1), ThreadId(2)];
        let s = sync(&live, AnalysisMode::Plain);
        for relation in [Relation::Dc, Relation::Wdc] {
            let mut lock = LockState::new(relation, layout());
            let mut a = ThreadContext::new(ThreadId(0), layout(), 2, false);
            let mut b = ThreadContext::new(ThreadId(1), layout(), 2, false);

            lock.on_acquire(&mut a, &s).unwrap();
            lock.on_release(&mut a, &s).unwrap();
            lock.on_acquire(&mut b, &s).unwrap();
            lock.on_release(&mut b, &s).unwrap();

            // b never learned a's release, so neither does the lock.
            assert_eq!(layout().clock(lock.clock().get(ThreadId(0))), 0, "{relation}");
            assert_eq!(layout().clock(lock.clock().get(ThreadId(1))), 3, "{relation}");
        }
    }

    #[test]
    fn test_wdc_acquire_does_not_join() {
        let live = [ThreadId(0), ThreadId(1)];
        let s = sync(&live, AnalysisMode::Plain);
        let mut lock = LockState::new(Relation::Wdc, layout());
        let mut a = ThreadContext::new(ThreadId(0), layout(), 2, false);
        let mut b = ThreadContext::new(ThreadId(1), layout(), 2, false);

        lock.on_acquire(&mut a, &s).unwrap();
        lock.on_release(&mut a, &s).unwrap();
        lock.on_acquire(&mut b, &s).unwrap();
        assert_eq!(clock_of(&b, 0), 0);
        assert_eq!(clock_of(&b, 1), 3);

        // A hard acquire does join.
        lock.on_hard_acquire(&mut b, &s).unwrap();
        assert_eq!(clock_of(&b, 0), 3);
    }

    #[test]
    fn test_snapshot_mode_opens_and_closes_critical_section() {
        let live = [ThreadId(0)];
        let s = sync(&live, AnalysisMode::Snapshot);
        let mut lock = LockState::new(Relation::Wdc, layout());
        let mut a = ThreadContext::new(ThreadId(0), layout(), 2, false);

        let cm = lock.on_acquire(&mut a, &s).unwrap().unwrap();
        assert_eq!(layout().clock(cm.read().get(ThreadId(0))), layout().max_clock());
        lock.on_release(&mut a, &s).unwrap();
        assert_eq!(layout().clock(cm.read().get(ThreadId(0))), 3);
    }

    #[test]
    fn test_wcp_rule_b_orders_releases() {
        let l = layout();
        let live = [ThreadId(0), ThreadId(1)];
        let s = sync(&live, AnalysisMode::Plain);
        let mut lock = LockState::new(Relation::Wcp, l);
        let mut a = ThreadContext::new(ThreadId(0), l, 1, true);
        let mut b = ThreadContext::new(ThreadId(1), l, 1, true);

        lock.on_acquire(&mut a, &s).unwrap();
        let a_release = a.access_epoch();
        lock.on_release(&mut a, &s).unwrap();

        // a's acquire snapshot is dominated by b's clock at b's release.
        lock.on_acquire(&mut b, &s).unwrap();
        let drained = lock.on_release(&mut b, &s).unwrap();
        assert_eq!(drained, 1);
        assert!(b.ordered(a_release));
    }

    #[test]
    fn test_dc_acquire_queues_for_others_only() {
        let live = [ThreadId(0), ThreadId(1)];
        let s = sync(&live, AnalysisMode::Plain);
        let mut lock = LockState::new(Relation::Dc, layout());
        let mut a = ThreadContext::new(ThreadId(0), layout(), 2, false);
        lock.on_acquire(&mut a, &s).unwrap();
        assert_eq!(lock.pending_rule_b(ThreadId(0)), 0);
        assert_eq!(lock.pending_rule_b(ThreadId(1)), 1);
    }
}
