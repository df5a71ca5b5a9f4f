//! SIEVE policy engine.
//!
//! A single FIFO list, one visited bit per entry, and a moving hand. Simpler
//! than LRU and scan-resistant: a lookup only flips a bit and never moves the
//! node, so one-time scans cannot reorder the working set.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SieveCore<K, V> Layout                    │
//! │                                                                  │
//! │   items: FxHashMap<K, NodePtr>        nodes owned by the list    │
//! │                                                                  │
//! │   head (newest)                              tail (oldest)       │
//! │     ▼                                            ▼               │
//! │    [F] ◄──► [E] ◄──► [D] ◄──► [C] ◄──► [B] ◄──► [A]              │
//! │                       ▲                                          │
//! │                      hand (eviction sweep resumes here)          │
//! │                                                                  │
//! │   Sweep direction: tail → head, wrapping back to the tail.       │
//! │   visited == true  → clear the bit, keep sweeping                │
//! │   visited == false → evict, hand = predecessor                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The hand survives across evictions, so the sweep resumes where it left
//! off instead of rescanning from the tail. Every removal path repairs the
//! hand before unlinking the node it points at.
//!
//! ## References
//!
//! - Zhang et al., "SIEVE is Simpler than LRU: an Efficient Turn-Key
//!   Eviction Algorithm for Web Caches", NSDI 2024

use std::hash::Hash;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::ds::{BucketWheel, ListNode, NodeList};
use crate::traits::{EvictReason, EvictionPolicy, OnEvictCallback};

/// Node payload: key, value, and the visited bit.
struct Entry<K, V> {
    key: K,
    value: V,
    visited: bool,
    expires_at: Option<Instant>,
    bucket_id: u8,
}

type EntryPtr<K, V> = NonNull<ListNode<Entry<K, V>>>;

/// SIEVE policy engine: one list, one hand, one visited bit per entry.
/// Drive it through [`EvictionPolicy`] or wrap it in
/// [`Cache`](crate::cache::Cache) for locking and background expiration.
pub struct SieveCore<K, V> {
    items: FxHashMap<K, EntryPtr<K, V>>,
    list: NodeList<Entry<K, V>>,
    hand: Option<EntryPtr<K, V>>,
    wheel: BucketWheel<K>,
    callback: Option<OnEvictCallback<K, V>>,
    capacity: usize,
    ttl: Duration,
}

// SAFETY: the NonNull pointers in `items` and `hand` refer to nodes owned
// exclusively by `list`; moving the engine moves ownership of every node
// with it. The callback box is itself `Send`.
unsafe impl<K: Send, V: Send> Send for SieveCore<K, V> {}

impl<K, V> SieveCore<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates an engine bounded to `capacity` entries. A `ttl` of zero
    /// disables expiration tracking.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        assert!(capacity > 0, "cache size must be greater than zero");
        Self {
            items: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            list: NodeList::new(),
            hand: None,
            wheel: BucketWheel::new(),
            callback: None,
            capacity,
            ttl,
        }
    }

    /// Number of cached entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no entries are cached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts or updates `key`, evicting one entry first when full.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(&ptr) = self.items.get(&key) {
            // SAFETY: the index only holds pointers to live list nodes.
            let entry = unsafe { &mut (*ptr.as_ptr()).elem };
            entry.value = value;
            entry.visited = true;
            if !self.ttl.is_zero() {
                self.wheel.detach(&entry.key, entry.bucket_id);
                let expires_at = Instant::now() + self.ttl;
                entry.expires_at = Some(expires_at);
                entry.bucket_id = self.wheel.attach(entry.key.clone(), expires_at);
            }
            return;
        }

        if self.list.len() >= self.capacity {
            self.evict();
        }

        let entry = Entry {
            key: key.clone(),
            value,
            visited: false,
            expires_at: None,
            bucket_id: 0,
        };
        let ptr = self.list.push_front(entry);
        if !self.ttl.is_zero() {
            let expires_at = Instant::now() + self.ttl;
            // SAFETY: `ptr` was just returned by push_front.
            unsafe {
                let entry = &mut (*ptr.as_ptr()).elem;
                entry.expires_at = Some(expires_at);
                entry.bucket_id = self.wheel.attach(key.clone(), expires_at);
            }
        }
        self.items.insert(key, ptr);
    }

    /// Looks up `key`, marking it visited on a hit. The node is not moved;
    /// this is what makes SIEVE scan-resistant.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let &ptr = self.items.get(key)?;
        // SAFETY: the index only holds pointers to live list nodes.
        let entry = unsafe { &mut (*ptr.as_ptr()).elem };
        entry.visited = true;
        Some(&entry.value)
    }

    /// Looks up `key` without touching the visited bit.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let &ptr = self.items.get(key)?;
        // SAFETY: the index only holds pointers to live list nodes.
        unsafe { Some(&(*ptr.as_ptr()).elem.value) }
    }

    /// Returns `true` if `key` is cached, without side effects.
    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.items.contains_key(key)
    }

    /// Removes `key`, reporting [`EvictReason::Removed`]. Returns `false` if
    /// the key was absent.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(&ptr) = self.items.get(key) else {
            return false;
        };
        self.remove_node(ptr, EvictReason::Removed);
        true
    }

    /// Drops every entry, reporting [`EvictReason::Removed`] for each. The
    /// hand and the expiration cursor are reset.
    pub fn purge(&mut self) {
        self.hand = None;
        self.items.clear();
        self.wheel.reset();
        while let Some(node) = self.list.pop_back() {
            let Entry { key, value, .. } = node.into_elem();
            if let Some(callback) = self.callback.as_mut() {
                callback(key, value, EvictReason::Removed);
            }
        }
    }

    /// Installs (or clears) the eviction callback.
    pub fn set_on_evicted(&mut self, callback: Option<OnEvictCallback<K, V>>) {
        self.callback = callback;
    }

    /// Steps the wheel cursor; see [`BucketWheel::advance`].
    pub fn next_expiry_bucket(&mut self) -> (usize, Option<Instant>) {
        self.wheel.advance()
    }

    /// Drains wheel bucket `index`, retiring every entry it held with reason
    /// [`EvictReason::Expired`].
    pub fn expire_bucket(&mut self, index: usize) {
        for key in self.wheel.take(index) {
            let ptr = self
                .items
                .get(&key)
                .copied()
                .expect("expired key is missing from the index");
            self.remove_node(ptr, EvictReason::Expired);
        }
    }

    /// Sweeps from the hand (or the tail) toward the head, clearing visited
    /// bits, and evicts the first unvisited entry. The hand is left on the
    /// evicted node's predecessor.
    fn evict(&mut self) {
        if self.list.is_empty() {
            return;
        }
        let mut cursor = self.hand.or_else(|| self.list.back());
        loop {
            let Some(ptr) = cursor else {
                // Ran past the head; wrap to the tail.
                cursor = self.list.back();
                continue;
            };
            // SAFETY: the sweep only visits live list nodes; the hand is
            // repaired on every removal.
            let entry = unsafe { &mut (*ptr.as_ptr()).elem };
            if !entry.visited {
                self.hand = unsafe { ptr.as_ref().prev() };
                let node = unsafe { self.list.unlink(ptr) };
                self.retire(node, EvictReason::Evicted);
                return;
            }
            entry.visited = false;
            cursor = unsafe { ptr.as_ref().prev() };
        }
    }

    /// Unlinks `ptr` after repairing the hand, then retires the node.
    fn remove_node(&mut self, ptr: EntryPtr<K, V>, reason: EvictReason) {
        if self.hand == Some(ptr) {
            // SAFETY: the hand always points at a live list node.
            self.hand = unsafe { ptr.as_ref().prev() };
        }
        // SAFETY: the index only holds pointers to live list nodes.
        let node = unsafe { self.list.unlink(ptr) };
        self.retire(node, reason);
    }

    /// Final bookkeeping for a node that left the list: unindex, detach from
    /// the wheel, fire the callback.
    fn retire(&mut self, node: Box<ListNode<Entry<K, V>>>, reason: EvictReason) {
        let Entry {
            key,
            value,
            expires_at,
            bucket_id,
            ..
        } = node.into_elem();
        self.items.remove(&key);
        if expires_at.is_some() {
            self.wheel.detach(&key, bucket_id);
        }
        if let Some(callback) = self.callback.as_mut() {
            callback(key, value, reason);
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.items.len() != self.list.len() {
            return Err(format!(
                "index size {} != list size {}",
                self.items.len(),
                self.list.len()
            ));
        }
        if self.items.len() > self.capacity {
            return Err(format!(
                "len {} exceeds capacity {}",
                self.items.len(),
                self.capacity
            ));
        }
        self.list.debug_validate_invariants();
        for entry in self.list.iter() {
            if !self.items.contains_key(&entry.key) {
                return Err("listed key missing from the index".to_string());
            }
        }
        if self.hand.is_some() && self.list.is_empty() {
            return Err("hand set while the list is empty".to_string());
        }
        Ok(())
    }

    #[cfg(test)]
    fn visited(&self, key: &K) -> Option<bool> {
        self.items
            .get(key)
            .map(|&ptr| unsafe { (*ptr.as_ptr()).elem.visited })
    }
}

impl<K, V> EvictionPolicy<K, V> for SieveCore<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn set(&mut self, key: K, value: V) {
        SieveCore::set(self, key, value)
    }

    #[inline]
    fn get(&mut self, key: &K) -> Option<&V> {
        SieveCore::get(self, key)
    }

    #[inline]
    fn peek(&self, key: &K) -> Option<&V> {
        SieveCore::peek(self, key)
    }

    #[inline]
    fn contains(&self, key: &K) -> bool {
        SieveCore::contains(self, key)
    }

    #[inline]
    fn remove(&mut self, key: &K) -> bool {
        SieveCore::remove(self, key)
    }

    #[inline]
    fn len(&self) -> usize {
        SieveCore::len(self)
    }

    #[inline]
    fn capacity(&self) -> usize {
        SieveCore::capacity(self)
    }

    fn purge(&mut self) {
        SieveCore::purge(self)
    }

    fn set_on_evicted(&mut self, callback: Option<OnEvictCallback<K, V>>) {
        SieveCore::set_on_evicted(self, callback)
    }

    fn next_expiry_bucket(&mut self) -> (usize, Option<Instant>) {
        SieveCore::next_expiry_bucket(self)
    }

    fn expire_bucket(&mut self, index: usize) {
        SieveCore::expire_bucket(self, index)
    }
}

impl<K, V> std::fmt::Debug for SieveCore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SieveCore")
            .field("capacity", &self.capacity)
            .field("len", &self.items.len())
            .field("hand_set", &self.hand.is_some())
            .finish_non_exhaustive()
    }
}
