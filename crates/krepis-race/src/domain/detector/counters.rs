//! Engine Counters
//!
//! Relaxed atomics bumped on the access path when `count_events` is set.
//! [`EngineCounters`] is a point-in-time copy.

use crate::domain::relation::Relation;
use crate::domain::shadow::Transition;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) fast_path_hits: AtomicU64,
    pub(crate) slow_path_entries: AtomicU64,
    pub(crate) first_accesses: AtomicU64,
    pub(crate) races: AtomicU64,
    pub(crate) acquires: AtomicU64,
    pub(crate) releases: AtomicU64,
    pub(crate) rule_b_absorbed: AtomicU64,
    pub(crate) volatile_accesses: AtomicU64,
    transitions: [AtomicU64; Transition::ALL.len()],
}

impl Counters {
    #[inline]
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn transition(&self, t: Transition) {
        Self::bump(&self.transitions[t.index()]);
    }

    pub(crate) fn snapshot(&self, relation: Relation) -> EngineCounters {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineCounters {
            relation,
            fast_path_hits: load(&self.fast_path_hits),
            slow_path_entries: load(&self.slow_path_entries),
            first_accesses: load(&self.first_accesses),
            races: load(&self.races),
            acquires: load(&self.acquires),
            releases: load(&self.releases),
            rule_b_absorbed: load(&self.rule_b_absorbed),
            volatile_accesses: load(&self.volatile_accesses),
            transitions: Transition::ALL
                .iter()
                .map(|t| (t.name(), load(&self.transitions[t.index()])))
                .filter(|&(_, n)| n > 0)
                .collect(),
        }
    }
}

/// Counter snapshot of one relation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineCounters {
    /// Engine relation
    pub relation: Relation,
    /// Accesses resolved by the lock-free probe
    pub fast_path_hits: u64,
    /// Accesses that took the location lock
    pub slow_path_entries: u64,
    /// Accesses that created shadow state
    pub first_accesses: u64,
    /// Conflicts found by this engine
    pub races: u64,
    /// Outermost acquires (including wait returns)
    pub acquires: u64,
    /// Outermost releases (including waits)
    pub releases: u64,
    /// Rule (b) snapshots absorbed at release
    pub rule_b_absorbed: u64,
    /// Volatile reads and writes
    pub volatile_accesses: u64,
    /// Non-zero slow-path transition counts
    pub transitions: BTreeMap<&'static str, u64>,
}

impl EngineCounters {
    /// Accesses seen by the engine
    pub fn accesses(&self) -> u64 {
        self.fast_path_hits + self.slow_path_entries + self.first_accesses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_skips_zero_transitions() {
        let counters = Counters::default();
        Counters::bump(&counters.fast_path_hits);
        Counters::bump(&counters.slow_path_entries);
        counters.transition(Transition::ReadShare);
        counters.transition(Transition::ReadShare);

        let snap = counters.snapshot(Relation::Dc);
        assert_eq!(snap.accesses(), 2);
        assert_eq!(snap.transitions.len(), 1);
        assert_eq!(snap.transitions["read_share"], 2);
    }
}
