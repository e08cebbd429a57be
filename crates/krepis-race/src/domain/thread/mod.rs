//! Thread Module - Per-Thread Clocks and Held Locks
//!
//! One [`ThreadContext`] per (relation engine, live thread). Created at
//! thread-create, updated by every event of its thread, absorbed into the
//! parent and dropped at join.

pub mod context;

pub use context::{HbShadow, HeldLock, SharedClock, ThreadContext};
