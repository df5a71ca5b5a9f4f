//! S3-FIFO (Simple, Scalable, Scan-resistant FIFO) policy engine.
//!
//! Implements the S3-FIFO algorithm: three FIFO structures that together
//! achieve scan resistance without LRU bookkeeping.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       S3FifoCore<K, V> Layout                       │
//! │                                                                     │
//! │   items: FxHashMap<K, NodePtr>       nodes owned by the queues      │
//! │                                                                     │
//! │   SMALL QUEUE (probation)            MAIN QUEUE (protected)         │
//! │   ┌─────────────────────────┐        ┌─────────────────────────┐    │
//! │   │ head               tail │        │ head               tail │    │
//! │   │  ▼                    ▼ │        │  ▼                    ▼ │    │
//! │   │ [new] ◄──► [old] ◄──┤   │        │ [hot] ◄──► [warm] ◄──┤  │    │
//! │   │  ▲          evict here  │        │  ▲          evict here  │    │
//! │   │  │   freq ≤ 1 → ghost   │        │  │   freq == 0 → out    │    │
//! │   │ insert                  │        │ ghost hit / promotion   │    │
//! │   └─────────────────────────┘        └─────────────────────────┘    │
//! │                                                                     │
//! │   GHOST (keys only, capacity = cache size)                          │
//! │   ┌─────────────────────────────────────────────────────────────┐   │
//! │   │  evicted-from-small keys; a returning key is admitted       │   │
//! │   │  straight into main                                         │   │
//! │   └─────────────────────────────────────────────────────────────┘   │
//! │                                                                     │
//! │   TTL: BucketWheel<K> registering every entry while ttl > 0         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Flow
//!
//! ```text
//! set(key, value):
//!   1. Key exists? → overwrite, bump freq (cap 3), refresh wheel slot
//!   2. Evict until len < capacity
//!   3. Key in ghost? → drop from ghost, push to main head
//!      Otherwise    → push to small head
//!
//! get(key):
//!   miss → None; hit → freq = min(freq + 1, 3), drop key from ghost
//!
//! evict():
//!   |small| > capacity/10 → evict_from_small()
//!   otherwise             → evict_from_main()  (small again if main empty)
//!
//! evict_from_small():  take small tail repeatedly:
//!   freq > 1 → move to main head; main overflowed → evict_from_main()
//!   freq ≤ 1 → drop (reason Evicted), record key in ghost, stop
//!
//! evict_from_main():   take main tail repeatedly:
//!   freq > 0 → freq -= 1, recycle to main head
//!   freq == 0 → drop (reason Evicted), stop
//! ```
//!
//! Both eviction loops terminate: every non-evicting step strictly decreases
//! the total frequency mass or the small queue length.
//!
//! ## References
//!
//! - Yang et al., "FIFO queues are all you need for cache eviction", SOSP 2023

use std::hash::Hash;
use std::ptr::NonNull;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::ds::{BucketWheel, GhostSet, ListNode, NodeList};
use crate::traits::{EvictReason, EvictionPolicy, OnEvictCallback};

/// Maximum frequency value (2 bits).
const MAX_FREQ: u8 = 3;

/// Which queue a node currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Small,
    Main,
}

/// Node payload: key, value, and policy metadata.
struct Entry<K, V> {
    key: K,
    value: V,
    freq: u8,
    queue: QueueKind,
    expires_at: Option<Instant>,
    bucket_id: u8,
}

type EntryPtr<K, V> = NonNull<ListNode<Entry<K, V>>>;

/// S3-FIFO policy engine: small, main, and ghost structures plus the TTL
/// wheel. Drive it through [`EvictionPolicy`] or wrap it in
/// [`Cache`](crate::cache::Cache) for locking and background expiration.
pub struct S3FifoCore<K, V> {
    items: FxHashMap<K, EntryPtr<K, V>>,
    small: NodeList<Entry<K, V>>,
    main: NodeList<Entry<K, V>>,
    ghost: GhostSet<K>,
    wheel: BucketWheel<K>,
    callback: Option<OnEvictCallback<K, V>>,
    capacity: usize,
    ttl: Duration,
}

// SAFETY: the NonNull pointers in `items` refer to nodes owned exclusively by
// `small` and `main`; moving the engine moves ownership of every node with
// it. The callback box is itself `Send`.
unsafe impl<K: Send, V: Send> Send for S3FifoCore<K, V> {}

impl<K, V> S3FifoCore<K, V>
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
            small: NodeList::new(),
            main: NodeList::new(),
            ghost: GhostSet::new(capacity),
            wheel: BucketWheel::new(),
            callback: None,
            capacity,
            ttl,
        }
    }

    /// Number of cached entries (small + main; ghost keys are not counted).
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

    /// Number of entries in the probationary small queue.
    #[inline]
    pub fn small_len(&self) -> usize {
        self.small.len()
    }

    /// Number of entries in the protected main queue.
    #[inline]
    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    /// Number of keys tracked by the ghost set.
    #[inline]
    pub fn ghost_len(&self) -> usize {
        self.ghost.len()
    }

    /// Inserts or updates `key`, evicting as needed first.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(&ptr) = self.items.get(&key) {
            // SAFETY: the index only holds pointers to live queue nodes.
            let entry = unsafe { &mut (*ptr.as_ptr()).elem };
            entry.value = value;
            entry.freq = (entry.freq + 1).min(MAX_FREQ);
            if !self.ttl.is_zero() {
                self.wheel.detach(&entry.key, entry.bucket_id);
                let expires_at = Instant::now() + self.ttl;
                entry.expires_at = Some(expires_at);
                entry.bucket_id = self.wheel.attach(entry.key.clone(), expires_at);
            }
            return;
        }

        while self.items.len() >= self.capacity {
            self.evict();
        }

        let readmit = self.ghost.remove(&key);
        let entry = Entry {
            key: key.clone(),
            value,
            freq: 0,
            queue: if readmit {
                QueueKind::Main
            } else {
                QueueKind::Small
            },
            expires_at: None,
            bucket_id: 0,
        };
        let ptr = if readmit {
            self.main.push_front(entry)
        } else {
            self.small.push_front(entry)
        };
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

    /// Looks up `key`, bumping its frequency on a hit.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let &ptr = self.items.get(key)?;
        self.ghost.remove(key);
        // SAFETY: the index only holds pointers to live queue nodes.
        let entry = unsafe { &mut (*ptr.as_ptr()).elem };
        entry.freq = (entry.freq + 1).min(MAX_FREQ);
        Some(&entry.value)
    }

    /// Looks up `key` without touching the frequency counter.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let &ptr = self.items.get(key)?;
        // SAFETY: the index only holds pointers to live queue nodes.
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
        // SAFETY: the index only holds pointers to live queue nodes, and each
        // node's queue tag names the list that owns it.
        let node = unsafe {
            match (*ptr.as_ptr()).elem.queue {
                QueueKind::Small => self.small.unlink(ptr),
                QueueKind::Main => self.main.unlink(ptr),
            }
        };
        self.retire(node, EvictReason::Removed, false);
        true
    }

    /// Drops every entry, reporting [`EvictReason::Removed`] for each.
    pub fn purge(&mut self) {
        self.items.clear();
        self.ghost.clear();
        self.wheel.reset();
        while let Some(node) = self.small.pop_back() {
            let Entry { key, value, .. } = node.into_elem();
            if let Some(callback) = self.callback.as_mut() {
                callback(key, value, EvictReason::Removed);
            }
        }
        while let Some(node) = self.main.pop_back() {
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
            // SAFETY: the index only holds pointers to live queue nodes.
            let node = unsafe {
                match (*ptr.as_ptr()).elem.queue {
                    QueueKind::Small => self.small.unlink(ptr),
                    QueueKind::Main => self.main.unlink(ptr),
                }
            };
            self.retire(node, EvictReason::Expired, false);
        }
    }

    /// Picks the queue to evict from. Small is preferred while it exceeds
    /// its 10% share; an empty main falls back to small so that eviction
    /// always makes progress.
    fn evict(&mut self) {
        if self.small.len() > self.capacity / 10 {
            self.evict_from_small();
        } else if !self.main.is_empty() {
            self.evict_from_main();
        } else {
            self.evict_from_small();
        }
    }

    fn evict_from_small(&mut self) {
        let main_target = self.capacity / 10 * 9;
        while let Some(tail) = self.small.back() {
            // SAFETY: `tail` is a live node of `small`.
            let freq = unsafe { (*tail.as_ptr()).elem.freq };
            if freq > 1 {
                let mut node = self.small.pop_back().expect("small tail disappeared");
                node.elem.queue = QueueKind::Main;
                self.main.push_front_node(node);
                if self.main.len() > main_target {
                    self.evict_from_main();
                }
            } else {
                let node = self.small.pop_back().expect("small tail disappeared");
                self.retire(node, EvictReason::Evicted, true);
                return;
            }
        }
    }

    fn evict_from_main(&mut self) {
        while let Some(tail) = self.main.back() {
            // SAFETY: `tail` is a live node of `main`.
            let freq = unsafe { (*tail.as_ptr()).elem.freq };
            if freq > 0 {
                let mut node = self.main.pop_back().expect("main tail disappeared");
                node.elem.freq -= 1;
                self.main.push_front_node(node);
            } else {
                let node = self.main.pop_back().expect("main tail disappeared");
                self.retire(node, EvictReason::Evicted, false);
                return;
            }
        }
    }

    /// Final bookkeeping for a node that left the queues: unindex, detach
    /// from the wheel, update the ghost, fire the callback.
    fn retire(&mut self, node: Box<ListNode<Entry<K, V>>>, reason: EvictReason, record_ghost: bool) {
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
        self.ghost.remove(&key);
        if record_ghost {
            self.ghost.add(key.clone());
        }
        if let Some(callback) = self.callback.as_mut() {
            callback(key, value, reason);
        }
    }

    #[cfg(any(test, debug_assertions))]
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.items.len() != self.small.len() + self.main.len() {
            return Err(format!(
                "index size {} != small {} + main {}",
                self.items.len(),
                self.small.len(),
                self.main.len()
            ));
        }
        if self.items.len() > self.capacity {
            return Err(format!(
                "len {} exceeds capacity {}",
                self.items.len(),
                self.capacity
            ));
        }
        for (list, kind) in [(&self.small, QueueKind::Small), (&self.main, QueueKind::Main)] {
            list.debug_validate_invariants();
            for entry in list.iter() {
                if entry.queue != kind {
                    return Err(format!("node tagged {:?} found in {:?}", entry.queue, kind));
                }
                if entry.freq > MAX_FREQ {
                    return Err(format!("freq {} exceeds cap {}", entry.freq, MAX_FREQ));
                }
                if !self.items.contains_key(&entry.key) {
                    return Err("queued key missing from the index".to_string());
                }
                if self.ghost.contains(&entry.key) {
                    return Err("cached key also present in the ghost set".to_string());
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn freq_of(&self, key: &K) -> Option<u8> {
        self.items
            .get(key)
            .map(|&ptr| unsafe { (*ptr.as_ptr()).elem.freq })
    }
}

impl<K, V> EvictionPolicy<K, V> for S3FifoCore<K, V>
where
    K: Clone + Eq + Hash,
{
    #[inline]
    fn set(&mut self, key: K, value: V) {
        S3FifoCore::set(self, key, value)
    }

    #[inline]
    fn get(&mut self, key: &K) -> Option<&V> {
        S3FifoCore::get(self, key)
    }

    #[inline]
    fn peek(&self, key: &K) -> Option<&V> {
        S3FifoCore::peek(self, key)
    }

    #[inline]
    fn contains(&self, key: &K) -> bool {
        S3FifoCore::contains(self, key)
    }

    #[inline]
    fn remove(&mut self, key: &K) -> bool {
        S3FifoCore::remove(self, key)
    }

    #[inline]
    fn len(&self) -> usize {
        S3FifoCore::len(self)
    }

    #[inline]
    fn capacity(&self) -> usize {
        S3FifoCore::capacity(self)
    }

    fn purge(&mut self) {
        S3FifoCore::purge(self)
    }

    fn set_on_evicted(&mut self, callback: Option<OnEvictCallback<K, V>>) {
        S3FifoCore::set_on_evicted(self, callback)
    }

    fn next_expiry_bucket(&mut self) -> (usize, Option<Instant>) {
        S3FifoCore::next_expiry_bucket(self)
    }

    fn expire_bucket(&mut self, index: usize) {
        S3FifoCore::expire_bucket(self, index)
    }
}

impl<K, V> std::fmt::Debug for S3FifoCore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3FifoCore")
            .field("capacity", &self.capacity)
            .field("len", &self.items.len())
            .field("small_len", &self.small.len())
            .field("main_len", &self.main.len())
            .field("ghost_len", &self.ghost.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_TTL: Duration = Duration::ZERO;

    // ==============================================
    // Basic Operations
    // ==============================================

    mod basic_operations {
        use super::*;

        #[test]
        fn new_engine_is_empty() {
            let core: S3FifoCore<&str, i32> = S3FifoCore::new(10, NO_TTL);
            assert!(core.is_empty());
            assert_eq!(core.len(), 0);
            assert_eq!(core.capacity(), 10);
        }

        #[test]
        fn set_and_get_round_trip() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            for i in 1..=10 {
                core.set(i, i * 10);
            }
            for i in 1..=10 {
                assert_eq!(core.get(&i), Some(&(i * 10)));
            }
            core.check_invariants().unwrap();
        }

        #[test]
        fn get_missing_key_returns_none() {
            let mut core: S3FifoCore<&str, i32> = S3FifoCore::new(10, NO_TTL);
            core.set("exists", 1);
            assert_eq!(core.get(&"missing"), None);
        }

        #[test]
        fn update_in_place_keeps_len() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set("hello", "world");
            core.set("hello2", "world");
            core.set("hello", "changed");

            assert_eq!(core.len(), 2);
            assert_eq!(core.get(&"hello"), Some(&"changed"));
        }

        #[test]
        fn remove_existing_and_missing() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set(1, 10);
            assert!(core.remove(&1));
            assert_eq!(core.get(&1), None);
            assert!(!core.remove(&-1));
            core.check_invariants().unwrap();
        }

        #[test]
        fn peek_and_contains_have_no_side_effects() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set("key", 42);
            assert_eq!(core.freq_of(&"key"), Some(0));

            assert_eq!(core.peek(&"key"), Some(&42));
            assert!(core.contains(&"key"));
            assert_eq!(core.peek(&"missing"), None);

            assert_eq!(core.freq_of(&"key"), Some(0));
        }

        #[test]
        fn purge_empties_everything() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set(1, 1);
            core.set(2, 2);
            assert_eq!(core.len(), 2);

            core.purge();
            assert_eq!(core.len(), 0);
            assert!(!core.contains(&1));
            assert_eq!(core.ghost_len(), 0);
            core.check_invariants().unwrap();
        }

        #[test]
        #[should_panic(expected = "cache size must be greater than zero")]
        fn zero_capacity_panics() {
            let _core: S3FifoCore<u32, u32> = S3FifoCore::new(0, NO_TTL);
        }
    }

    // ==============================================
    // Queue Behaviour
    // ==============================================

    mod queue_behaviour {
        use super::*;

        #[test]
        fn fresh_insert_goes_to_small() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set("key", 1);
            assert_eq!(core.small_len(), 1);
            assert_eq!(core.main_len(), 0);
        }

        #[test]
        fn frequency_saturates_at_three() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set("key", 1);
            for _ in 0..8 {
                core.get(&"key");
            }
            assert_eq!(core.freq_of(&"key"), Some(3));
        }

        #[test]
        fn update_bumps_frequency() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            core.set("key", 1);
            core.set("key", 2);
            assert_eq!(core.freq_of(&"key"), Some(1));
        }

        #[test]
        fn ghost_hit_admits_to_main() {
            let mut core = S3FifoCore::new(5, NO_TTL);
            for i in 1..=5 {
                core.set(i, i);
            }
            // Evicts the oldest small entry (key 1, freq 0) into the ghost.
            core.set(6, 6);
            assert!(!core.contains(&1));
            assert_eq!(core.ghost_len(), 1);

            core.set(1, 100);
            assert!(core.contains(&1));
            assert_eq!(core.main_len(), 1);
            assert_eq!(core.ghost_len(), 1);
            core.check_invariants().unwrap();
        }

        #[test]
        fn capacity_bound_holds_under_pressure() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            for i in 0..1000 {
                core.set(i, i);
                assert!(core.len() <= 10);
            }
            assert_eq!(core.len(), 10);
            core.check_invariants().unwrap();
        }
    }

    // ==============================================
    // Eviction Policy
    // ==============================================

    mod eviction_policy {
        use super::*;

        #[test]
        fn one_hit_wonders_evicted_before_popular_keys() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            let one_hit = [1, 2];
            let popular = [3, 4, 5, 6, 7, 8, 9, 10];

            for &k in one_hit.iter().chain(popular.iter()) {
                core.set(k, k);
            }
            for &k in &one_hit {
                core.get(&k);
            }
            for _ in 0..3 {
                for &k in &popular {
                    core.get(&k);
                }
            }

            for k in 11..=19 {
                core.set(k, k);
            }

            for &k in &one_hit {
                assert_eq!(core.get(&k), None, "one-hit key {k} should be gone");
            }
            for &k in &popular {
                assert!(core.get(&k).is_some(), "popular key {k} should survive");
            }
            core.check_invariants().unwrap();
        }

        #[test]
        fn small_eviction_records_ghost() {
            let mut core = S3FifoCore::new(5, NO_TTL);
            for i in 1..=6 {
                core.set(i, i);
            }
            assert_eq!(core.ghost_len(), 1);
        }

        #[test]
        fn accessed_small_entries_promoted_on_pressure() {
            let mut core: S3FifoCore<String, i32> = S3FifoCore::new(10, NO_TTL);
            core.set("hot".to_string(), 0);
            core.get(&"hot".to_string());
            core.get(&"hot".to_string());

            for i in 0..20 {
                core.set(format!("cold_{i}"), i);
            }
            assert!(core.contains(&"hot".to_string()));
            assert_eq!(core.main_len(), 1);
        }

        #[test]
        fn working_set_survives_scan() {
            let mut core = S3FifoCore::new(100, NO_TTL);
            for i in 0..30 {
                core.set(i, i);
                core.get(&i);
                core.get(&i);
            }
            for i in 1000..1200 {
                core.set(i, i);
            }

            let survivors = (0..30).filter(|i| core.contains(i)).count();
            assert!(survivors >= 25, "expected working set to survive, got {survivors}");
        }
    }

    // ==============================================
    // Callbacks
    // ==============================================

    mod callbacks {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use super::*;

        #[test]
        fn eviction_reports_reason_evicted() {
            let mut core = S3FifoCore::new(3, NO_TTL);
            let evicted = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&evicted);
            core.set_on_evicted(Some(Box::new(move |_k: i32, _v: i32, reason| {
                assert_eq!(reason, EvictReason::Evicted);
                counter.fetch_add(1, Ordering::SeqCst);
            })));

            for i in 0..6 {
                core.set(i, i);
            }
            assert_eq!(evicted.load(Ordering::SeqCst), 3);
        }

        #[test]
        fn remove_and_purge_report_reason_removed() {
            let mut core = S3FifoCore::new(10, NO_TTL);
            let removed = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&removed);
            core.set_on_evicted(Some(Box::new(move |_k: i32, _v: i32, reason| {
                assert_eq!(reason, EvictReason::Removed);
                counter.fetch_add(1, Ordering::SeqCst);
            })));

            for i in 0..5 {
                core.set(i, i);
            }
            assert!(core.remove(&0));
            core.purge();
            assert_eq!(removed.load(Ordering::SeqCst), 5);
        }
    }
}
