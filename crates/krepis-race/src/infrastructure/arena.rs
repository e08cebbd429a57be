//! Generational Arena - Shadow State Storage
//!
//! # Design Philosophy
//!
//! Every lock, memory location, volatile and class the host program touches
//! gets shadow state. The host names them with arbitrary 64-bit ids and tells
//! us when they die. We need:
//! - O(1) lookup from host id to shadow state on every event
//! - a small, copyable key that other shadow structures can hold
//!   (Rule (a) maps are keyed by location, deferred snapshot entries by lock)
//! - reclamation that never lets a stale key alias a newer object
//!
//! # Implementation Strategy
//!
//! Two layers:
//!
//! ```text
//! Registry<K, T>
//!   ├─ index: DashMap<K, Handle>         host id -> handle (sharded)
//!   └─ arena: Arena<T>
//!        └─ RwLock<Vec<Slot<T>>>         dense slots + free list
//!             Slot { generation, Option<Arc<T>> }
//! ```
//!
//! A [`Handle`] is `(index, generation)`. Freeing a slot bumps its generation,
//! so any handle minted before the free no longer resolves, and any map keyed
//! by handles can purge dead entries by asking [`Arena::contains`].
//!
//! ## Why DashMap for the index?
//!
//! Lookups dominate and come from every program thread at once. DashMap
//! shards the index so threads touching different objects rarely contend.
//! The arena lock itself is only held for a slot read or a push.
//!
//! ## Lock Order
//!
//! `index shard -> arena`. Neither is ever held while acquiring detector
//! state locks, so both are leaves with respect to the detector's own order.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable generational handle into an [`Arena`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    /// Slot index
    #[inline(always)]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation the slot had when this handle was minted
    #[inline(always)]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<Arc<T>>,
}

struct ArenaInner<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

/// Dense generational slot storage
pub struct Arena<T> {
    inner: RwLock<ArenaInner<T>>,
    reclaimed: AtomicU64,
}

impl<T> Arena<T> {
    /// Empty arena
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ArenaInner {
                slots: Vec::new(),
                free: Vec::new(),
            }),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Store a value built from its own handle
    pub fn insert_with(&self, build: impl FnOnce(Handle) -> T) -> (Handle, Arc<T>) {
        let mut inner = self.inner.write();
        let handle = match inner.free.pop() {
            Some(index) => Handle {
                index,
                generation: inner.slots[index as usize].generation,
            },
            None => {
                let index = inner.slots.len() as u32;
                inner.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                Handle { index, generation: 0 }
            }
        };
        let value = Arc::new(build(handle));
        inner.slots[handle.index as usize].value = Some(Arc::clone(&value));
        (handle, value)
    }

    /// Resolve a handle (None once the slot has been reclaimed)
    #[inline]
    pub fn get(&self, handle: Handle) -> Option<Arc<T>> {
        let inner = self.inner.read();
        let slot = inner.slots.get(handle.index as usize)?;
        if slot.generation == handle.generation {
            slot.value.clone()
        } else {
            None
        }
    }

    /// Whether a handle still resolves
    #[inline]
    pub fn contains(&self, handle: Handle) -> bool {
        let inner = self.inner.read();
        inner
            .slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Reclaim a slot, invalidating every outstanding handle to it
    pub fn remove(&self, handle: Handle) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let slot = inner.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(handle.index);
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    /// Live slot count
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.slots.len() - inner.free.len()
    }

    /// Whether no slot is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of reclamations so far (monotonic)
    #[inline]
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Snapshot of every live value
    pub fn values(&self) -> Vec<Arc<T>> {
        let inner = self.inner.read();
        inner.slots.iter().filter_map(|s| s.value.clone()).collect()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Host id -> generational handle -> shadow state
pub struct Registry<K, T> {
    index: DashMap<K, Handle>,
    arena: Arena<T>,
}

impl<K: Eq + Hash + Copy, T> Registry<K, T> {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            index: DashMap::new(),
            arena: Arena::new(),
        }
    }

    /// Look up `key`, creating its shadow state on first sight
    ///
    /// Returns whether the state was created by this call.
    pub fn get_or_insert_with(&self, key: K, build: impl FnOnce(Handle) -> T) -> (Arc<T>, bool) {
        if let Some(handle) = self.index.get(&key).map(|h| *h) {
            if let Some(value) = self.arena.get(handle) {
                return (value, false);
            }
        }
        match self.index.entry(key) {
            Entry::Occupied(mut occupied) => {
                if let Some(value) = self.arena.get(*occupied.get()) {
                    return (value, false);
                }
                let (handle, value) = self.arena.insert_with(build);
                occupied.insert(handle);
                (value, true)
            }
            Entry::Vacant(vacant) => {
                let (handle, value) = self.arena.insert_with(build);
                vacant.insert(handle);
                (value, true)
            }
        }
    }

    /// Existing shadow state for `key`
    pub fn get(&self, key: &K) -> Option<Arc<T>> {
        let handle = *self.index.get(key)?;
        self.arena.get(handle)
    }

    /// Handle currently bound to `key`
    pub fn handle(&self, key: &K) -> Option<Handle> {
        self.index.get(key).map(|h| *h)
    }

    /// Shadow state behind a handle
    #[inline]
    pub fn resolve(&self, handle: Handle) -> Option<Arc<T>> {
        self.arena.get(handle)
    }

    /// Whether `handle` is still live
    #[inline]
    pub fn is_live(&self, handle: Handle) -> bool {
        self.arena.contains(handle)
    }

    /// Drop the shadow state of a dead host object
    pub fn remove(&self, key: &K) -> Option<Arc<T>> {
        let (_, handle) = self.index.remove(key)?;
        self.arena.remove(handle)
    }

    /// Reclamation counter of the backing arena
    #[inline]
    pub fn reclaimed(&self) -> u64 {
        self.arena.reclaimed()
    }

    /// Live entry count
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Snapshot of every live value
    pub fn values(&self) -> Vec<Arc<T>> {
        self.arena.values()
    }
}

impl<K: Eq + Hash + Copy, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self::new()
    }
}
