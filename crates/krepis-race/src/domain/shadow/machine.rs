//! Access State Machine (Slow Path)
//!
//! Runs under the location lock. Every entry point starts with the same
//! same-epoch check the fast path makes, so disabling the fast path never
//! changes a verdict.
//!
//! # States
//!
//! ```text
//!                 read by other, ordered
//!   ┌─────────┐ ─────────────────────────▶ ┌───────────┐
//!   │  Owned  │                            │ Exclusive │
//!   └─────────┘ ◀───────────────────────── └───────────┘
//!        │          read/write by same          │
//!        │                                      │ read by other, unordered
//!        ▼ write (any)                          ▼
//!   ┌─────────────────────────┐          ┌────────────┐
//!   │ collapse: W = R = E     │ ◀─────── │   Shared   │ (R = READ_SHARED)
//!   └─────────────────────────┘  write   └────────────┘
//! ```
//!
//! Plain mode runs the classic epoch machine. Owned and snapshot modes track
//! single ownership and skip checks that the `W <= R` discipline already
//! covers.
//!
//! Per access at most one conflict is reported; when a write meets several,
//! the last one found wins.

use super::location::{LocationMeta, ShadowLocation};
use super::snapshot::{
    absorb_deferred_reads, absorb_deferred_writes, outermost_orders, resolve, resolve_deferring,
};
use crate::domain::clock::Epoch;
use crate::domain::ids::ThreadId;
use crate::domain::relation::AnalysisMode;
use crate::domain::thread::ThreadContext;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of conflicting access pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceKind {
    /// Prior write, current read
    WriteRead,
    /// Prior write, current write
    WriteWrite,
    /// Prior read, current write
    ReadWrite,
    /// Prior read out of a shared-read vector, current write
    SharedReadWrite,
}

impl fmt::Display for RaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RaceKind::WriteRead => "write-read",
            RaceKind::WriteWrite => "write-write",
            RaceKind::ReadWrite => "read-write",
            RaceKind::SharedReadWrite => "shared-read-write",
        })
    }
}

/// One unordered prior access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    /// Conflict kind
    pub kind: RaceKind,
    /// Thread of the prior access
    pub prior: ThreadId,
}

/// State transition taken by one access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Read at the epoch already recorded
    ReadSameEpoch,
    /// Read by the last reader
    ReadOwned,
    /// Read ordered after the last reader
    ReadExclusive,
    /// Read concurrent with the last reader: widen to shared
    ReadShare,
    /// First read by this thread in the shared period
    ReadShared,
    /// Repeat read by this thread in the shared period
    ReadSharedOwned,
    /// Write at the epoch already recorded
    WriteSameEpoch,
    /// Write by the last reader
    WriteOwned,
    /// Write by another thread, epoch state
    WriteExclusive,
    /// Write over a shared-read vector
    WriteShared,
}

impl Transition {
    /// All transitions, in counter order
    pub const ALL: [Transition; 10] = [
        Transition::ReadSameEpoch,
        Transition::ReadOwned,
        Transition::ReadExclusive,
        Transition::ReadShare,
        Transition::ReadShared,
        Transition::ReadSharedOwned,
        Transition::WriteSameEpoch,
        Transition::WriteOwned,
        Transition::WriteExclusive,
        Transition::WriteShared,
    ];

    /// Dense index into counter arrays
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// snake_case name
    pub const fn name(self) -> &'static str {
        match self {
            Transition::ReadSameEpoch => "read_same_epoch",
            Transition::ReadOwned => "read_owned",
            Transition::ReadExclusive => "read_exclusive",
            Transition::ReadShare => "read_share",
            Transition::ReadShared => "read_shared",
            Transition::ReadSharedOwned => "read_shared_owned",
            Transition::WriteSameEpoch => "write_same_epoch",
            Transition::WriteOwned => "write_owned",
            Transition::WriteExclusive => "write_exclusive",
            Transition::WriteShared => "write_shared",
        }
    }
}

/// Outcome of one slow-path access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Transition taken
    pub transition: Transition,
    /// Unordered prior access, if any
    pub conflict: Option<Conflict>,
}

impl Step {
    const fn clean(transition: Transition) -> Self {
        Self {
            transition,
            conflict: None,
        }
    }
}

/// Slow-path read
pub fn read(loc: &ShadowLocation, meta: &mut LocationMeta, ctx: &mut ThreadContext, mode: AnalysisMode) -> Step {
    let e = ctx.access_epoch();
    if loc.same_epoch_read(ctx.tid(), e) {
        return Step::clean(Transition::ReadSameEpoch);
    }
    match mode {
        AnalysisMode::Plain => read_plain(loc, ctx, e),
        AnalysisMode::Owned => read_owned(loc, ctx, e),
        AnalysisMode::Snapshot => read_snapshot(loc, meta, ctx, e),
    }
}

/// Slow-path write
pub fn write(loc: &ShadowLocation, meta: &mut LocationMeta, ctx: &mut ThreadContext, mode: AnalysisMode) -> Step {
    let e = ctx.access_epoch();
    if loc.same_epoch_write(e) {
        return Step::clean(Transition::WriteSameEpoch);
    }
    match mode {
        AnalysisMode::Plain => write_plain(loc, ctx, e),
        AnalysisMode::Owned => write_owned(loc, ctx, e),
        AnalysisMode::Snapshot => write_snapshot(loc, meta, ctx, e),
    }
}

fn unordered_write(loc: &ShadowLocation, ctx: &ThreadContext) -> Option<Conflict> {
    let w = loc.w();
    let wt = ctx.layout().tid(w);
    (wt != ctx.tid() && !ctx.ordered(w)).then_some(Conflict {
        kind: RaceKind::WriteRead,
        prior: wt,
    })
}

/// Last shared reader, other than the writer, not ordered before it
fn last_unordered_reader(loc: &ShadowLocation, ctx: &ThreadContext) -> Option<Conflict> {
    let readers = loc.readers();
    let mut start = 0;
    let mut last = None;
    while let Some(t) = ctx.first_unordered(&readers, start) {
        if t != ctx.tid() {
            last = Some(t);
        }
        start = t.as_usize() + 1;
    }
    last.map(|prior| Conflict {
        kind: RaceKind::SharedReadWrite,
        prior,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plain
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn read_plain(loc: &ShadowLocation, ctx: &ThreadContext, e: Epoch) -> Step {
    let tid = ctx.tid();
    let conflict = unordered_write(loc, ctx);
    let r = loc.r();
    let transition = if r.is_read_shared() {
        loc.set_reader(tid, e);
        Transition::ReadShared
    } else {
        let rt = ctx.layout().tid(r);
        if rt == tid {
            loc.set_r(e);
            Transition::ReadOwned
        } else if ctx.ordered(r) {
            loc.set_r(e);
            Transition::ReadExclusive
        } else {
            loc.share(r, e);
            Transition::ReadShare
        }
    };
    Step { transition, conflict }
}

fn write_plain(loc: &ShadowLocation, ctx: &ThreadContext, e: Epoch) -> Step {
    let tid = ctx.tid();
    let layout = ctx.layout();
    let w = loc.w();
    let wt = layout.tid(w);
    let mut conflict = (wt != tid && !ctx.ordered(w)).then_some(Conflict {
        kind: RaceKind::WriteWrite,
        prior: wt,
    });

    let r = loc.r();
    let transition = if r.is_read_shared() {
        if let Some(shared) = last_unordered_reader(loc, ctx) {
            conflict = Some(shared);
        }
        Transition::WriteShared
    } else {
        let rt = layout.tid(r);
        if rt != tid && !ctx.ordered(r) {
            let kind = if r == w {
                RaceKind::WriteWrite
            } else {
                RaceKind::ReadWrite
            };
            conflict = Some(Conflict { kind, prior: rt });
        }
        if rt == tid {
            Transition::WriteOwned
        } else {
            Transition::WriteExclusive
        }
    };
    loc.collapse(e);
    Step { transition, conflict }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Owned
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn read_owned(loc: &ShadowLocation, ctx: &ThreadContext, e: Epoch) -> Step {
    let tid = ctx.tid();
    let layout = ctx.layout();
    let r = loc.r();
    if r.is_read_shared() {
        if layout.clock(loc.reader(tid)) != 0 {
            loc.set_reader(tid, e);
            return Step::clean(Transition::ReadSharedOwned);
        }
        let conflict = unordered_write(loc, ctx);
        loc.set_reader(tid, e);
        return Step {
            transition: Transition::ReadShared,
            conflict,
        };
    }

    let rt = layout.tid(r);
    if rt == tid {
        loc.set_r(e);
        Step::clean(Transition::ReadOwned)
    } else if ctx.ordered(r) {
        loc.set_r(e);
        Step::clean(Transition::ReadExclusive)
    } else {
        let conflict = unordered_write(loc, ctx);
        loc.share(r, e);
        Step {
            transition: Transition::ReadShare,
            conflict,
        }
    }
}

fn write_owned(loc: &ShadowLocation, ctx: &ThreadContext, e: Epoch) -> Step {
    let tid = ctx.tid();
    let r = loc.r();
    let step = if r.is_read_shared() {
        Step {
            transition: Transition::WriteShared,
            conflict: last_unordered_reader(loc, ctx),
        }
    } else {
        let rt = ctx.layout().tid(r);
        if rt == tid {
            Step::clean(Transition::WriteOwned)
        } else {
            let kind = if r == loc.w() {
                RaceKind::WriteWrite
            } else {
                RaceKind::ReadWrite
            };
            Step {
                transition: Transition::WriteExclusive,
                conflict: (!ctx.ordered(r)).then_some(Conflict { kind, prior: rt }),
            }
        }
    };
    loc.collapse(e);
    step
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write-read check of a read, resolved through the writer's snapshot list
fn snapshot_write_conflict(loc: &ShadowLocation, meta: &LocationMeta, ctx: &mut ThreadContext) -> Option<Conflict> {
    let w = loc.w();
    let wt = ctx.layout().tid(w);
    if wt == ctx.tid() || resolve(meta.wm.as_ref(), wt, ctx) || ctx.ordered(w) {
        return None;
    }
    Some(Conflict {
        kind: RaceKind::WriteRead,
        prior: wt,
    })
}

fn read_snapshot(loc: &ShadowLocation, meta: &mut LocationMeta, ctx: &mut ThreadContext, e: Epoch) -> Step {
    let tid = ctx.tid();
    let layout = ctx.layout();
    let held = ctx.snapshots();
    absorb_deferred_writes(&meta.ew, ctx);

    let r = loc.r();
    if r.is_read_shared() {
        let repeat = layout.clock(loc.reader(tid)) != 0;
        let conflict = if repeat {
            None
        } else {
            snapshot_write_conflict(loc, meta, ctx)
        };
        meta.shared_rm.insert(tid, held);
        loc.set_reader(tid, e);
        let transition = if repeat {
            Transition::ReadSharedOwned
        } else {
            Transition::ReadShared
        };
        return Step { transition, conflict };
    }

    let rt = layout.tid(r);
    if rt == tid {
        meta.rm = held;
        loc.set_r(e);
        return Step::clean(Transition::ReadOwned);
    }

    let concurrent = match &meta.rm {
        None => !ctx.ordered(r),
        Some(list) => !outermost_orders(list, rt, ctx),
    };
    if !concurrent {
        meta.rm = held;
        loc.set_r(e);
        return Step::clean(Transition::ReadExclusive);
    }

    let conflict = snapshot_write_conflict(loc, meta, ctx);
    let prior_rm = meta.rm.take();
    meta.shared_rm.clear();
    meta.shared_rm.insert(rt, prior_rm);
    meta.shared_rm.insert(tid, held);
    loc.share(r, e);
    Step {
        transition: Transition::ReadShare,
        conflict,
    }
}

fn write_snapshot(loc: &ShadowLocation, meta: &mut LocationMeta, ctx: &mut ThreadContext, e: Epoch) -> Step {
    let tid = ctx.tid();
    let layout = ctx.layout();
    let held = ctx.snapshots();
    absorb_deferred_reads(&mut meta.er, &mut meta.ew, ctx);

    let w = loc.w();
    let wt = layout.tid(w);
    let r = loc.r();
    let mut conflict = None;

    let transition = if r.is_read_shared() {
        let readers: Vec<(ThreadId, Epoch)> = loc
            .readers()
            .iter()
            .filter(|&(t, re)| t != tid && layout.clock(re) != 0)
            .collect();
        for (prev, re) in readers {
            let list = meta.shared_rm.get(&prev).cloned().flatten();
            let resolved = resolve_deferring(list.as_ref(), prev, ctx, &mut meta.er, true);
            if !resolved && !ctx.ordered(re) {
                conflict = Some(Conflict {
                    kind: RaceKind::SharedReadWrite,
                    prior: prev,
                });
            }
        }
        if wt != tid {
            resolve_deferring(meta.wm.as_ref(), wt, ctx, &mut meta.ew, false);
        }
        meta.shared_rm.clear();
        Transition::WriteShared
    } else {
        let rt = layout.tid(r);
        if rt == tid {
            Transition::WriteOwned
        } else {
            let resolved = resolve_deferring(meta.rm.as_ref(), rt, ctx, &mut meta.er, true);
            if wt != tid {
                resolve_deferring(meta.wm.as_ref(), wt, ctx, &mut meta.ew, false);
            }
            if !resolved && !ctx.ordered(r) {
                let kind = if r == w {
                    RaceKind::WriteWrite
                } else {
                    RaceKind::ReadWrite
                };
                conflict = Some(Conflict { kind, prior: rt });
            }
            Transition::WriteExclusive
        }
    };

    meta.wm.clone_from(&held);
    meta.rm = held;
    loc.collapse(e);
    Step { transition, conflict }
}
