//! Rule (b) Queues
//!
//! Rule (b): if the acquire of an earlier critical section on `m` is ordered
//! before the release of a later one, the earlier release is ordered before
//! the later release too.
//!
//! Every acquire snapshot is queued for every other thread; every release
//! snapshot likewise. A releasing thread pops matching (acquire, release)
//! pairs from the front of its own queues while the queued acquire is
//! dominated by its clock, absorbing the release half each time.
//!
//! ```text
//! acquire by t:  acquires[u].push(t, C)   for live u != t
//!                global_acquires.push(t, C)
//! release by t:  releases[u].push(t, R)   for live u != t
//!                global_releases.push(t, R)
//! ```
//!
//! Per-thread queues are created lazily by cloning the global queues, so a
//! thread that shows up late still sees critical sections that started
//! before it. Pairing holds because critical sections on one lock never
//! overlap: the n-th acquire in a queue belongs with the n-th release.
//!
//! WCP uses one [`Fifo`] per consumer. DC keys every consumer queue by the
//! source thread as well ([`PerSourceFifo`]) and drains each source
//! independently.

use crate::domain::clock::VectorClock;
use crate::domain::ids::ThreadId;
use crate::domain::thread::ThreadContext;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Queue shape stored per consumer thread
pub trait SnapshotQueue: Clone + Default {
    /// Append a snapshot produced by `source`
    fn push(&mut self, source: ThreadId, snapshot: Arc<VectorClock>);

    /// Total queued snapshots
    fn len(&self) -> usize;

    /// Whether nothing is queued
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single FIFO of snapshots (WCP)
#[derive(Debug, Clone, Default)]
pub struct Fifo(VecDeque<Arc<VectorClock>>);

impl Fifo {
    /// Oldest snapshot
    pub fn front(&self) -> Option<&Arc<VectorClock>> {
        self.0.front()
    }

    /// Remove the oldest snapshot
    pub fn pop(&mut self) -> Option<Arc<VectorClock>> {
        self.0.pop_front()
    }
}

impl SnapshotQueue for Fifo {
    fn push(&mut self, _source: ThreadId, snapshot: Arc<VectorClock>) {
        self.0.push_back(snapshot);
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// One FIFO per source thread (DC)
#[derive(Debug, Clone, Default)]
pub struct PerSourceFifo(HashMap<ThreadId, VecDeque<Arc<VectorClock>>>);

impl PerSourceFifo {
    /// Oldest snapshot from `source`
    pub fn front(&self, source: ThreadId) -> Option<&Arc<VectorClock>> {
        self.0.get(&source).and_then(VecDeque::front)
    }

    /// Remove the oldest snapshot from `source`
    pub fn pop(&mut self, source: ThreadId) -> Option<Arc<VectorClock>> {
        let queue = self.0.get_mut(&source)?;
        let snapshot = queue.pop_front();
        if queue.is_empty() {
            self.0.remove(&source);
        }
        snapshot
    }
}

impl SnapshotQueue for PerSourceFifo {
    fn push(&mut self, source: ThreadId, snapshot: Arc<VectorClock>) {
        self.0.entry(source).or_default().push_back(snapshot);
    }

    fn len(&self) -> usize {
        self.0.values().map(VecDeque::len).sum()
    }
}

/// Acquire and release queues of one lock
#[derive(Debug, Clone, Default)]
pub struct RuleBQueues<Q> {
    acquires: HashMap<ThreadId, Q>,
    releases: HashMap<ThreadId, Q>,
    global_acquires: Q,
    global_releases: Q,
}

impl<Q: SnapshotQueue> RuleBQueues<Q> {
    /// Empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the acquire snapshot of `td` for every other live thread
    pub fn enqueue_acquire(&mut self, td: ThreadId, snapshot: VectorClock, live: &[ThreadId]) {
        let snapshot = Arc::new(snapshot);
        for &other in live {
            let queue = self
                .acquires
                .entry(other)
                .or_insert_with(|| self.global_acquires.clone());
            if other != td {
                queue.push(td, Arc::clone(&snapshot));
            }
        }
        self.global_acquires.push(td, snapshot);
        self.releases
            .entry(td)
            .or_insert_with(|| self.global_releases.clone());
    }

    /// Queue the release snapshot of `td` for every other live thread
    pub fn enqueue_release(&mut self, td: ThreadId, snapshot: VectorClock, live: &[ThreadId]) {
        let snapshot = Arc::new(snapshot);
        for &other in live {
            if other == td {
                continue;
            }
            self.releases
                .entry(other)
                .or_insert_with(|| self.global_releases.clone())
                .push(td, Arc::clone(&snapshot));
        }
        self.global_releases.push(td, snapshot);
    }

    /// Both queues of consumer `td`, if it has any
    pub fn consumer(&mut self, td: ThreadId) -> Option<(&mut Q, &mut Q)> {
        let acquires = self.acquires.get_mut(&td)?;
        let releases = self.releases.get_mut(&td)?;
        Some((acquires, releases))
    }

    /// Drop queues of threads that are no longer live
    pub fn retain_live(&mut self, live: &[ThreadId]) {
        self.acquires.retain(|t, _| live.contains(t));
        self.releases.retain(|t, _| live.contains(t));
    }

    /// Number of consumer threads with queues
    pub fn consumers(&self) -> usize {
        self.acquires.len()
    }

    /// Snapshots queued for `td`
    pub fn pending(&self, td: ThreadId) -> usize {
        self.acquires.get(&td).map_or(0, SnapshotQueue::len)
    }
}

impl RuleBQueues<Fifo> {
    /// Drain pairs while the queued acquire is dominated by `bound`
    ///
    /// Returns the release snapshots to absorb, oldest first.
    pub fn drain_ordered(&mut self, td: ThreadId, bound: &VectorClock) -> Vec<Arc<VectorClock>> {
        let mut absorbed = Vec::new();
        let Some((acquires, releases)) = self.consumer(td) else {
            return absorbed;
        };
        while acquires.front().is_some_and(|acq| !acq.any_gt(bound)) {
            acquires.pop();
            match releases.pop() {
                Some(rel) => absorbed.push(rel),
                None => break,
            }
        }
        absorbed
    }
}

impl RuleBQueues<PerSourceFifo> {
    /// Drain pairs from `source` while the queued acquire is dominated by
    /// the consumer's live clock, absorbing each release as it goes
    ///
    /// Returns the number of pairs absorbed.
    pub fn drain_from(&mut self, source: ThreadId, ctx: &mut ThreadContext) -> usize {
        let Some((acquires, releases)) = self.consumer(ctx.tid()) else {
            return 0;
        };
        let mut absorbed = 0;
        while acquires
            .front(source)
            .is_some_and(|acq| !acq.any_gt(ctx.clock()))
        {
            acquires.pop(source);
            let Some(rel) = releases.pop(source) else {
                break;
            };
            ctx.absorb(&rel);
            absorbed += 1;
        }
        absorbed
    }
}
