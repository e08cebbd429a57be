//! Domain Layer - Causality Relations and Shadow State
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Clock Module                  Thread Module                │
//! │  ├─ Epoch / EpochLayout        └─ ThreadContext             │
//! │  └─ VectorClock                   (V, vHB, held locks)      │
//! │                                                             │
//! │  Lock Module                   Shadow Module                │
//! │  ├─ LockShadow                 ├─ ShadowLocation            │
//! │  ├─ LockState (HB/WCP/DC/WDC)  ├─ machine (slow path)       │
//! │  ├─ RuleAMaps                  └─ snapshot lists            │
//! │  └─ RuleBQueues                                             │
//! │                                                             │
//! │                   Detector Module                           │
//! │                   ├─ Detector (orchestrator)                │
//! │                   ├─ RelationEngine (one per relation)      │
//! │                   └─ RaceReport / RaceSink / RaceStatistics │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Relations
//!
//! HB is the strongest relation and WDC the weakest. Weaker relations order
//! fewer event pairs and so flag more accesses as racing; every HB race is
//! also a WCP, DC and WDC race.
//!
//! ```rust
//! use krepis_race::domain::*;
//! use std::sync::Arc;
//!
//! let sink = Arc::new(CollectingSink::new());
//! let detector = Detector::new(
//!     DetectorConfig::default().with_relations(Relation::ALL),
//!     sink.clone(),
//! )
//! .unwrap();
//!
//! // Writes in critical sections on the same lock are ordered under every relation.
//! for tid in [ThreadId(0), ThreadId(1)] {
//!     detector.acquire(tid, LockId(1)).unwrap();
//!     detector.write(tid, LocationId(7), None).unwrap();
//!     detector.release(tid, LockId(1)).unwrap();
//! }
//! assert!(sink.is_empty());
//! ```

pub mod clock;
pub mod detector;
pub mod error;
pub mod ids;
pub mod lock;
pub mod relation;
pub mod shadow;
pub mod thread;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-exports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub use clock::{Epoch, EpochLayout, VectorClock, MAX_SUPPORTED_THREADS};
pub use detector::{
    AccessKind, CollectingSink, Detector, DetectorConfig, EngineCounters, Event, RaceCount,
    RaceReport, RaceSink, RaceStatistics, RelationEngine, StaticRaceKey, TracingSink,
};
pub use error::{DetectorError, DetectorResult};
pub use ids::{ClassId, LocationId, LockId, SiteId, ThreadId};
pub use relation::{AnalysisMode, Relation, RelationSet};
pub use shadow::{Conflict, RaceKind, Transition};
pub use thread::ThreadContext;
