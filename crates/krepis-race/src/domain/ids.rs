//! Identifier Types - Stable Host Identities
//!
//! The instrumentation layer names every thread, lock, memory location and
//! class with a small integer. These newtypes keep the four id spaces apart
//! so a `LockId` can never be passed where a `LocationId` is expected.
//!
//! All identifiers are `serde(transparent)`, so a recorded trace spells them
//! as bare integers:
//!
//! ```text
//! {"op":"acquire","tid":1,"lock":7}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Thread identifier
///
/// Thread ids are dense and small: they index vector-clock slots directly.
/// Validation against the configured capacity happens in the detector, since
/// the bound depends on [`DetectorConfig::max_threads`].
///
/// [`DetectorConfig::max_threads`]: crate::domain::DetectorConfig
///
/// # Example
///
/// ```rust
/// use krepis_race::domain::ThreadId;
///
/// let main = ThreadId::new(0);
/// assert_eq!(main.as_usize(), 0);
/// assert_eq!(main.to_string(), "Thread(0)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// Create a new ThreadId
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Slot index in a vector clock
    #[inline(always)]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Lock (monitor) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(pub u64);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock({})", self.0)
    }
}

/// Memory location identifier
///
/// One id per field instance or array element. Volatile locations share this
/// id space but are tracked in a separate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub u64);

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Loc({})", self.0)
    }
}

/// Class identifier (static initialization synchronization)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u64);

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.0)
    }
}

/// Source site of an access (used to count statically unique races)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub u32);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Site({})", self.0)
    }
}
