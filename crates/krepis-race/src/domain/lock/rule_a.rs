//! Rule (a) Maps
//!
//! Rule (a): two critical sections on the same lock that contain conflicting
//! accesses are ordered release-to-access.
//!
//! During a critical section the lock remembers which locations were read
//! and written (`read_vars`, `write_vars`). At release each of them maps to
//! the releasing clock (`read_map`, `write_map`). A later access to `x` under
//! the same lock absorbs the map entries it conflicts with:
//!
//! ```text
//! read  x under m:  V ⊔= write_map[m][x]
//! write x under m:  V ⊔= read_map[m][x] ⊔ write_map[m][x]
//! ```
//!
//! Locations are identified by arena handle. Handles of reclaimed locations
//! never resolve again, so entries for them are purged lazily whenever the
//! location arena reports new reclamations.

use crate::domain::clock::VectorClock;
use crate::infrastructure::Handle;
use std::collections::{HashMap, HashSet};

const SHRINK_FLOOR: usize = 16;

/// Whether a table of `capacity` holding `len` entries should be rebuilt
///
/// Shrinks once capacity exceeds the floor and occupancy drops under the
/// tenth of the usable load.
#[inline]
pub fn should_shrink(len: usize, capacity: usize) -> bool {
    capacity > SHRINK_FLOOR && 40 * len < 3 * capacity
}

fn shrink_map<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>) {
    if should_shrink(map.len(), map.capacity()) {
        map.shrink_to(map.len() * 8 / 3);
    }
}

fn shrink_set<K: std::hash::Hash + Eq>(set: &mut HashSet<K>) {
    if should_shrink(set.len(), set.capacity()) {
        set.shrink_to(set.len() * 8 / 3);
    }
}

/// Location-keyed critical-section memory of one lock
#[derive(Debug, Default)]
pub struct RuleAMaps {
    read_vars: HashSet<Handle>,
    write_vars: HashSet<Handle>,
    read_map: HashMap<Handle, VectorClock>,
    write_map: HashMap<Handle, VectorClock>,
    seen_reclaimed: u64,
}

impl RuleAMaps {
    /// Empty maps
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a read of `loc` in the current critical section
    #[inline]
    pub fn note_read(&mut self, loc: Handle) {
        self.read_vars.insert(loc);
    }

    /// Note a write of `loc` in the current critical section
    #[inline]
    pub fn note_write(&mut self, loc: Handle) {
        self.write_vars.insert(loc);
    }

    /// Release-time clock of the last critical section that wrote `loc`
    #[inline]
    pub fn last_write(&self, loc: Handle) -> Option<&VectorClock> {
        self.write_map.get(&loc)
    }

    /// Release-time clock of the last critical section that read `loc`
    #[inline]
    pub fn last_read(&self, loc: Handle) -> Option<&VectorClock> {
        self.read_map.get(&loc)
    }

    /// Whether `loc` was read in the current critical section
    pub fn reads(&self, loc: Handle) -> bool {
        self.read_vars.contains(&loc)
    }

    /// Whether `loc` was written in the current critical section
    pub fn writes(&self, loc: Handle) -> bool {
        self.write_vars.contains(&loc)
    }

    /// Map every location touched in the critical section to `clock`
    pub fn publish(&mut self, clock: &VectorClock) {
        for &loc in &self.read_vars {
            self.read_map
                .entry(loc)
                .or_insert_with(|| VectorClock::new(clock.layout()))
                .max(clock);
        }
        for &loc in &self.write_vars {
            self.write_map
                .entry(loc)
                .or_insert_with(|| VectorClock::new(clock.layout()))
                .max(clock);
        }
    }

    /// Forget the finished critical section and bound memory
    pub fn reset(&mut self) {
        self.read_vars.clear();
        self.write_vars.clear();
        shrink_set(&mut self.read_vars);
        shrink_set(&mut self.write_vars);
        shrink_map(&mut self.read_map);
        shrink_map(&mut self.write_map);
    }

    /// Drop entries of reclaimed locations when `reclaimed` moved
    ///
    /// Returns the number of entries removed.
    pub fn purge(&mut self, reclaimed: u64, is_live: impl Fn(Handle) -> bool) -> usize {
        if reclaimed == self.seen_reclaimed {
            return 0;
        }
        self.seen_reclaimed = reclaimed;
        let before = self.tracked();
        self.read_vars.retain(|h| is_live(*h));
        self.write_vars.retain(|h| is_live(*h));
        self.read_map.retain(|h, _| is_live(*h));
        self.write_map.retain(|h, _| is_live(*h));
        before - self.tracked()
    }

    /// Total tracked entries
    pub fn tracked(&self) -> usize {
        self.read_vars.len() + self.write_vars.len() + self.read_map.len() + self.write_map.len()
    }
}
