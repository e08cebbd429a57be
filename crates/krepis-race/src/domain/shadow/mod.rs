//! Shadow Module - Per-Location Access History and Race Checks
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ access(tid, x)                                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │ 1. ShadowLocation::try_fast_*   lock-free same-epoch probe  │
//! │ 2. ShadowLocation::lock         location lock               │
//! │ 3. machine::{read, write}       Plain | Owned | Snapshot    │
//! │      └─ snapshot::*             held-lock list walks        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod location;
pub mod machine;
pub mod snapshot;

pub use location::{FastPathOutcome, LocationMeta, ShadowLocation};
pub use machine::{Conflict, RaceKind, Step, Transition};
pub use snapshot::{DeferredSnapshots, SnapshotEntry, SnapshotList};
