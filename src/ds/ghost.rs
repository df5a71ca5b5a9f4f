//! Bounded FIFO set of recently evicted keys.
//!
//! The S3-FIFO engine consults this set on insert: a key that comes back
//! shortly after eviction is admitted straight into the main queue instead of
//! the probationary small queue. No values are stored.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      GhostSet Layout                         │
//! │                                                              │
//! │   ┌──────────────────────┐    ┌────────────────────────┐     │
//! │   │  ring: KeyRing<K>    │    │  index: FxHashSet<K>   │     │
//! │   │                      │    │                        │     │
//! │   │  head ─► [A][B][C]   │    │  { A, B, C }           │     │
//! │   │  (eviction order)    │    │  (membership)          │     │
//! │   └──────────────────────┘    └────────────────────────┘     │
//! │                                                              │
//! │   add(D) when full: pop A from ring, drop A from index,      │
//! │                     push D, insert D                         │
//! │   remove(B): drop B from index only; the stale ring slot     │
//! │              ages out on a later overflow                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Membership queries go through the hash index, so a ring slot left behind
//! by `remove` can never produce a false positive; it merely lets the set
//! run slightly below capacity until that slot cycles out.
//!
//! ## Example Usage
//!
//! ```
//! use fifokit::ds::GhostSet;
//!
//! let mut ghost = GhostSet::new(2);
//! ghost.add("a");
//! ghost.add("b");
//! ghost.add("c"); // "a" was oldest, gone now
//!
//! assert!(!ghost.contains(&"a"));
//! assert!(ghost.contains(&"b"));
//! assert!(ghost.contains(&"c"));
//! ```

use std::hash::Hash;

use rustc_hash::FxHashSet;

use crate::ds::key_ring::KeyRing;

/// Bounded FIFO record of recently evicted keys (no values).
#[derive(Debug)]
pub struct GhostSet<K> {
    ring: KeyRing<K>,
    index: FxHashSet<K>,
}

impl<K> GhostSet<K>
where
    K: Eq + Hash + Clone,
{
    /// Creates a ghost set holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: KeyRing::new(capacity),
            index: FxHashSet::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Records `key` as recently evicted. No-op when already present.
    /// Displaces the oldest recorded key when full.
    pub fn add(&mut self, key: K) {
        if self.index.contains(&key) {
            return;
        }
        if self.ring.is_full() {
            if let Some(oldest) = self.ring.pop() {
                self.index.remove(&oldest);
            }
        }
        if self.ring.push(key.clone()) {
            self.index.insert(key);
        }
    }

    /// Forgets `key`. Returns `true` if it was recorded.
    pub fn remove(&mut self, key: &K) -> bool {
        self.index.remove(key)
    }

    /// Returns `true` if `key` was recently evicted.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains(key)
    }
}

impl<K> GhostSet<K> {
    /// Number of recorded keys.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` when no keys are recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of recorded keys.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Forgets every recorded key.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.index.clear();
    }
}
