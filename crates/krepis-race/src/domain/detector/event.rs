//! Instrumentation Events
//!
//! One JSON object per event, tagged by `op`:
//!
//! ```text
//! {"op":"thread_create","tid":0}
//! {"op":"fork","tid":0,"child":1}
//! {"op":"acquire","tid":1,"lock":7}
//! {"op":"write","tid":1,"loc":100,"site":12}
//! {"op":"release","tid":1,"lock":7}
//! ```

use crate::domain::ids::{ClassId, LocationId, LockId, SiteId, ThreadId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One event of the observed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Event {
    /// A thread becomes known to the detector
    ThreadCreate {
        /// New thread
        tid: ThreadId,
        /// Creating thread, if any (informational; `fork` carries the edge)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<ThreadId>,
    },
    /// Monitor enter
    Acquire {
        /// Acting thread
        tid: ThreadId,
        /// Lock entered
        lock: LockId,
    },
    /// Monitor exit
    Release {
        /// Acting thread
        tid: ThreadId,
        /// Lock exited
        lock: LockId,
    },
    /// Plain read
    Read {
        /// Acting thread
        tid: ThreadId,
        /// Location read
        loc: LocationId,
        /// Source site
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site: Option<SiteId>,
        /// Class owning the field when it is static
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<ClassId>,
    },
    /// Plain write
    Write {
        /// Acting thread
        tid: ThreadId,
        /// Location written
        loc: LocationId,
        /// Source site
        #[serde(default, skip_serializing_if = "Option::is_none")]
        site: Option<SiteId>,
        /// Class owning the field when it is static
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<ClassId>,
    },
    /// Volatile read
    VolatileRead {
        /// Acting thread
        tid: ThreadId,
        /// Volatile location
        loc: LocationId,
    },
    /// Volatile write
    VolatileWrite {
        /// Acting thread
        tid: ThreadId,
        /// Volatile location
        loc: LocationId,
    },
    /// Thread start, issued by the parent
    Fork {
        /// Parent
        tid: ThreadId,
        /// Started thread
        child: ThreadId,
    },
    /// Thread join, issued by the joiner after the child terminated
    Join {
        /// Joiner
        tid: ThreadId,
        /// Joined thread
        child: ThreadId,
    },
    /// Pre-wait: the monitor is released
    Wait {
        /// Waiting thread
        tid: ThreadId,
        /// Monitor waited on
        lock: LockId,
    },
    /// Post-wait: the monitor is re-acquired
    WaitReturn {
        /// Woken thread
        tid: ThreadId,
        /// Monitor waited on
        lock: LockId,
    },
    /// Notify or notify-all
    Notify {
        /// Notifying thread
        tid: ThreadId,
        /// Monitor notified
        lock: LockId,
    },
    /// Static initialization of a class finished
    ClassInit {
        /// Initializing thread
        tid: ThreadId,
        /// Initialized class
        class: ClassId,
    },
    /// First use of an initialized class by a thread
    ClassAccess {
        /// Accessing thread
        tid: ThreadId,
        /// Accessed class
        class: ClassId,
    },
    /// The host reclaimed a memory location
    LocationFreed {
        /// Reclaimed location
        loc: LocationId,
    },
    /// The host reclaimed a lock
    LockFreed {
        /// Reclaimed lock
        lock: LockId,
    },
}

impl Event {
    /// Acting thread (None for lifetime notifications)
    pub const fn tid(&self) -> Option<ThreadId> {
        match *self {
            Event::ThreadCreate { tid, .. }
            | Event::Acquire { tid, .. }
            | Event::Release { tid, .. }
            | Event::Read { tid, .. }
            | Event::Write { tid, .. }
            | Event::VolatileRead { tid, .. }
            | Event::VolatileWrite { tid, .. }
            | Event::Fork { tid, .. }
            | Event::Join { tid, .. }
            | Event::Wait { tid, .. }
            | Event::WaitReturn { tid, .. }
            | Event::Notify { tid, .. }
            | Event::ClassInit { tid, .. }
            | Event::ClassAccess { tid, .. } => Some(tid),
            Event::LocationFreed { .. } | Event::LockFreed { .. } => None,
        }
    }

    /// Whether the event is a plain memory access
    pub const fn is_access(&self) -> bool {
        matches!(self, Event::Read { .. } | Event::Write { .. })
    }

    /// `op` tag
    pub const fn op(&self) -> &'static str {
        match self {
            Event::ThreadCreate { .. } => "thread_create",
            Event::Acquire { .. } => "acquire",
            Event::Release { .. } => "release",
            Event::Read { .. } => "read",
            Event::Write { .. } => "write",
            Event::VolatileRead { .. } => "volatile_read",
            Event::VolatileWrite { .. } => "volatile_write",
            Event::Fork { .. } => "fork",
            Event::Join { .. } => "join",
            Event::Wait { .. } => "wait",
            Event::WaitReturn { .. } => "wait_return",
            Event::Notify { .. } => "notify",
            Event::ClassInit { .. } => "class_init",
            Event::ClassAccess { .. } => "class_access",
            Event::LocationFreed { .. } => "location_freed",
            Event::LockFreed { .. } => "lock_freed",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Event::Read { tid, loc, .. } => write!(f, "{tid} rd {loc}"),
            Event::Write { tid, loc, .. } => write!(f, "{tid} wr {loc}"),
            Event::Acquire { tid, lock } => write!(f, "{tid} acq {lock}"),
            Event::Release { tid, lock } => write!(f, "{tid} rel {lock}"),
            Event::Fork { tid, child } => write!(f, "{tid} fork {child}"),
            Event::Join { tid, child } => write!(f, "{tid} join {child}"),
            ref other => match other.tid() {
                Some(tid) => write!(f, "{tid} {}", other.op()),
                None => f.write_str(other.op()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged() {
        let e: Event = serde_json::from_str(r#"{"op":"acquire","tid":1,"lock":7}"#).unwrap();
        assert_eq!(
            e,
            Event::Acquire {
                tid: ThreadId(1),
                lock: LockId(7)
            }
        );
        assert_eq!(e.op(), "acquire");
    }

    #[test]
    fn test_optional_fields_default() {
        let e: Event = serde_json::from_str(r#"{"op":"write","tid":0,"loc":5}"#).unwrap();
        assert_eq!(
            e,
            Event::Write {
                tid: ThreadId(0),
                loc: LocationId(5),
                site: None,
                owner: None
            }
        );
        assert_eq!(serde_json::to_string(&e).unwrap(), r#"{"op":"write","tid":0,"loc":5}"#);
    }

    #[test]
    fn test_lifetime_events_have_no_thread() {
        let e: Event = serde_json::from_str(r#"{"op":"location_freed","loc":3}"#).unwrap();
        assert_eq!(e.tid(), None);
        assert!(!e.is_access());
        assert_eq!(e.to_string(), "location_freed");
    }

    #[test]
    fn test_display() {
        let e = Event::Read {
            tid: ThreadId(2),
            loc: LocationId(9),
            site: Some(SiteId(1)),
            owner: None,
        };
        assert_eq!(e.to_string(), "Thread(2) rd Loc(9)");
        let e = Event::WaitReturn {
            tid: ThreadId(1),
            lock: LockId(4),
        };
        assert_eq!(e.to_string(), "Thread(1) wait_return");
    }
}
