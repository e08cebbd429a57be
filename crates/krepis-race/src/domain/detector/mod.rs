//! Detector Module - Event Dispatch and Race Reporting
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Detector                                                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Event ──▶ engines (strongest relation first)                │
//! │             ├─ RelationEngine(HB)                            │
//! │             ├─ RelationEngine(WCP)                           │
//! │             ├─ RelationEngine(DC)                            │
//! │             └─ RelationEngine(WDC)                           │
//! │                     │ conflicts                              │
//! │                     ▼                                        │
//! │  RaceReport ──▶ RaceSink + RaceStatistics                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every event goes to every enabled engine. A racing access yields one
//! report, attributed to the strongest relation that flagged it.
//!
//! # Concurrency
//!
//! `Detector` is `Send + Sync`. Events of one thread must be delivered in
//! program order; events of different threads may arrive concurrently, in
//! any order consistent with the synchronization they describe.

pub mod config;
pub mod counters;
pub mod engine;
pub mod event;
pub mod report;
pub mod stats;

pub use config::DetectorConfig;
pub use counters::EngineCounters;
pub use engine::{AccessKind, RelationEngine};
pub use event::Event;
pub use report::{CollectingSink, RaceReport, RaceSink, TracingSink};
pub use stats::{RaceCount, RaceStatistics, StaticRaceKey};

use crate::domain::error::DetectorResult;
use crate::domain::ids::{ClassId, LocationId, LockId, SiteId, ThreadId};
use crate::domain::relation::{Relation, RelationSet};
use crate::domain::shadow::Conflict;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Multi-relation race detector
pub struct Detector {
    config: DetectorConfig,
    engines: Vec<RelationEngine>,
    sink: Arc<dyn RaceSink>,
    stats: Mutex<RaceStatistics>,
    events: AtomicU64,
}

impl Detector {
    /// Detector over the relations of `config`, reporting to `sink`
    ///
    /// # Example
    ///
    /// ```rust
    /// use krepis_race::domain::{CollectingSink, Detector, DetectorConfig, Relation, ThreadId, LocationId};
    /// use std::sync::Arc;
    ///
    /// let sink = Arc::new(CollectingSink::new());
    /// let config = DetectorConfig::default().with_relations([Relation::Hb, Relation::Wdc]);
    /// let detector = Detector::new(config, sink.clone()).unwrap();
    ///
    /// detector.write(ThreadId(0), LocationId(1), None).unwrap();
    /// detector.write(ThreadId(1), LocationId(1), None).unwrap();
    /// assert_eq!(sink.len(), 1);
    /// assert_eq!(sink.reports()[0].relation, Relation::Hb);
    /// ```
    pub fn new(config: DetectorConfig, sink: Arc<dyn RaceSink>) -> DetectorResult<Self> {
        config.validate()?;
        let engines = config
            .relations
            .iter()
            .map(|relation| RelationEngine::new(relation, &config))
            .collect::<DetectorResult<Vec<_>>>()?;
        info!(
            relations = ?config.relations,
            fast_path = config.epoch_fast_path,
            owned = config.owned_fast_path,
            snapshots = config.held_lock_snapshots,
            max_threads = config.max_threads,
            "🔎 race detector ready"
        );
        Ok(Self {
            config,
            engines,
            sink,
            stats: Mutex::new(RaceStatistics::new()),
            events: AtomicU64::new(0),
        })
    }

    /// Detector that logs every race through `tracing`
    pub fn with_tracing_sink(config: DetectorConfig) -> DetectorResult<Self> {
        Self::new(config, Arc::new(TracingSink))
    }

    /// Active configuration
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Engines, strongest relation first
    pub fn engines(&self) -> &[RelationEngine] {
        &self.engines
    }

    /// Engine of one relation, when enabled
    pub fn engine(&self, relation: Relation) -> Option<&RelationEngine> {
        self.engines.iter().find(|e| e.relation() == relation)
    }

    /// Events processed so far
    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    /// Copy of the race statistics
    pub fn statistics(&self) -> RaceStatistics {
        self.stats.lock().clone()
    }

    /// Per-engine counters (empty unless `count_events` is set)
    pub fn counters(&self) -> Vec<EngineCounters> {
        self.engines.iter().filter_map(RelationEngine::counters).collect()
    }

    #[inline]
    fn next_index(&self) -> u64 {
        self.events.fetch_add(1, Ordering::Relaxed)
    }

    fn each(&self, f: impl Fn(&RelationEngine) -> DetectorResult<()>) -> DetectorResult<()> {
        self.next_index();
        self.engines.iter().try_for_each(f)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Dispatch
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Process one event; returns the race it revealed, if any
    pub fn process(&self, event: &Event) -> DetectorResult<Option<RaceReport>> {
        match *event {
            Event::ThreadCreate { tid, .. } => self.thread_create(tid).map(|()| None),
            Event::Acquire { tid, lock } => self.acquire(tid, lock).map(|()| None),
            Event::Release { tid, lock } => self.release(tid, lock).map(|()| None),
            Event::Read { tid, loc, site, owner } => {
                self.access(tid, loc, AccessKind::Read, site, owner)
            }
            Event::Write { tid, loc, site, owner } => {
                self.access(tid, loc, AccessKind::Write, site, owner)
            }
            Event::VolatileRead { tid, loc } => self.volatile_read(tid, loc).map(|()| None),
            Event::VolatileWrite { tid, loc } => self.volatile_write(tid, loc).map(|()| None),
            Event::Fork { tid, child } => self.fork(tid, child).map(|()| None),
            Event::Join { tid, child } => self.join(tid, child).map(|()| None),
            Event::Wait { tid, lock } => self.wait(tid, lock).map(|()| None),
            Event::WaitReturn { tid, lock } => self.wait_return(tid, lock).map(|()| None),
            Event::Notify { tid, lock } => self.notify(tid, lock).map(|()| None),
            Event::ClassInit { tid, class } => self.class_init(tid, class).map(|()| None),
            Event::ClassAccess { tid, class } => self.class_access(tid, class).map(|()| None),
            Event::LocationFreed { loc } => {
                self.location_freed(loc);
                Ok(None)
            }
            Event::LockFreed { lock } => {
                self.lock_freed(lock);
                Ok(None)
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Threads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// A thread becomes known
    pub fn thread_create(&self, tid: ThreadId) -> DetectorResult<()> {
        self.each(|e| e.thread_create(tid))
    }

    /// `parent` starts `child`
    pub fn fork(&self, parent: ThreadId, child: ThreadId) -> DetectorResult<()> {
        self.each(|e| e.fork(parent, child))
    }

    /// `parent` joins the terminated `child`
    pub fn join(&self, parent: ThreadId, child: ThreadId) -> DetectorResult<()> {
        self.each(|e| e.join(parent, child))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Synchronization
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Monitor enter
    pub fn acquire(&self, tid: ThreadId, lock: LockId) -> DetectorResult<()> {
        self.each(|e| e.acquire(tid, lock))
    }

    /// Monitor exit
    pub fn release(&self, tid: ThreadId, lock: LockId) -> DetectorResult<()> {
        self.each(|e| e.release(tid, lock))
    }

    /// Pre-wait: the monitor is released
    pub fn wait(&self, tid: ThreadId, lock: LockId) -> DetectorResult<()> {
        self.each(|e| e.wait(tid, lock))
    }

    /// Post-wait: the monitor is re-acquired
    pub fn wait_return(&self, tid: ThreadId, lock: LockId) -> DetectorResult<()> {
        self.each(|e| e.wait_return(tid, lock))
    }

    /// Notify or notify-all
    pub fn notify(&self, tid: ThreadId, lock: LockId) -> DetectorResult<()> {
        self.each(|e| e.notify(tid, lock))
    }

    /// Volatile read
    pub fn volatile_read(&self, tid: ThreadId, loc: LocationId) -> DetectorResult<()> {
        self.each(|e| e.volatile_read(tid, loc))
    }

    /// Volatile write
    pub fn volatile_write(&self, tid: ThreadId, loc: LocationId) -> DetectorResult<()> {
        self.each(|e| e.volatile_write(tid, loc))
    }

    /// Static initialization of `class` finished
    pub fn class_init(&self, tid: ThreadId, class: ClassId) -> DetectorResult<()> {
        self.each(|e| e.class_init(tid, class))
    }

    /// First use of `class` by `tid`
    pub fn class_access(&self, tid: ThreadId, class: ClassId) -> DetectorResult<()> {
        self.each(|e| e.class_access(tid, class))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Accesses
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Plain read of an instance field or array element
    pub fn read(&self, tid: ThreadId, loc: LocationId, site: Option<SiteId>) -> DetectorResult<Option<RaceReport>> {
        self.access(tid, loc, AccessKind::Read, site, None)
    }

    /// Plain write of an instance field or array element
    pub fn write(&self, tid: ThreadId, loc: LocationId, site: Option<SiteId>) -> DetectorResult<Option<RaceReport>> {
        self.access(tid, loc, AccessKind::Write, site, None)
    }

    /// Plain access; `owner` is the class of a static field
    pub fn access(
        &self,
        tid: ThreadId,
        loc: LocationId,
        kind: AccessKind,
        site: Option<SiteId>,
        owner: Option<ClassId>,
    ) -> DetectorResult<Option<RaceReport>> {
        let index = self.next_index();
        let mut found: SmallVec<[(Relation, Conflict); 4]> = SmallVec::new();
        for engine in &self.engines {
            if let Some(conflict) = engine.access(tid, loc, kind, owner)? {
                found.push((engine.relation(), conflict));
            }
        }
        let Some(&(relation, conflict)) = found.first() else {
            return Ok(None);
        };

        let report = RaceReport {
            relation,
            flagged_by: found.iter().map(|&(r, _)| r).collect::<RelationSet>(),
            location: loc,
            site,
            kind: conflict.kind,
            prior_thread: conflict.prior,
            current_thread: tid,
            event_index: index,
        };
        self.stats.lock().record(&report);
        self.sink.report(&report);
        Ok(Some(report))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Lifetime
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// The host reclaimed a memory location
    pub fn location_freed(&self, loc: LocationId) {
        self.next_index();
        for engine in &self.engines {
            engine.location_freed(loc);
        }
    }

    /// The host reclaimed a lock
    pub fn lock_freed(&self, lock: LockId) {
        self.next_index();
        for engine in &self.engines {
            engine.lock_freed(lock);
        }
    }
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("config", &self.config)
            .field("engines", &self.engines)
            .field("events", &self.events())
            .finish_non_exhaustive()
    }
}
