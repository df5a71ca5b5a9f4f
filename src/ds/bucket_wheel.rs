//! Time-bucket wheel for amortised TTL expiration.
//!
//! Entries written within the same tick window land in the same bucket, so
//! the expiration worker can retire a whole batch by draining one bucket per
//! tick instead of scanning every entry.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                  BucketWheel (NUM_BUCKETS = 100)               │
//! │                                                                │
//! │     [0]   [1]   [2]   ...  [97]  [98]  [99]                    │
//! │      ▲                             ▲                           │
//! │      │                             │                           │
//! │  next_cleanup                 attach target                    │
//! │  (drained next)          (next_cleanup − 1 mod N:              │
//! │                           the bucket drained last,             │
//! │                           i.e. furthest in the future)         │
//! │                                                                │
//! │  Each bucket: FxHashSet<K> + newest_entry: Option<Instant>     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! With a tick of `ttl / NUM_BUCKETS`, the cursor needs a full `ttl` to come
//! back around, so by the time a bucket's turn arrives its entries are at or
//! past their expiry; `newest_entry` tells the worker exactly how much longer
//! to wait in the worst case.
//!
//! The wheel stores keys only. The policy engines resolve keys back to nodes
//! through their own index when draining.

use std::hash::Hash;
use std::time::Instant;

use rustc_hash::FxHashSet;

/// Number of buckets in the wheel. Entries in one bucket share an expiry
/// window of `ttl / NUM_BUCKETS`.
pub const NUM_BUCKETS: usize = 100;

#[derive(Debug)]
struct Bucket<K> {
    entries: FxHashSet<K>,
    newest_entry: Option<Instant>,
}

impl<K> Bucket<K> {
    fn new() -> Self {
        Self {
            entries: FxHashSet::default(),
            newest_entry: None,
        }
    }
}

/// Ring of [`NUM_BUCKETS`] key sets cycled by the expiration worker.
#[derive(Debug)]
pub struct BucketWheel<K> {
    buckets: Vec<Bucket<K>>,
    next_cleanup: usize,
}

impl<K> BucketWheel<K>
where
    K: Eq + Hash,
{
    /// Creates an empty wheel with the cursor on bucket 0.
    pub fn new() -> Self {
        Self {
            buckets: (0..NUM_BUCKETS).map(|_| Bucket::new()).collect(),
            next_cleanup: 0,
        }
    }

    /// Registers `key` in the bucket furthest from the cleanup cursor and
    /// returns that bucket's id. Raises the bucket's `newest_entry` if
    /// `expires_at` is later.
    pub fn attach(&mut self, key: K, expires_at: Instant) -> u8 {
        let id = (NUM_BUCKETS + self.next_cleanup - 1) % NUM_BUCKETS;
        let bucket = &mut self.buckets[id];
        bucket.entries.insert(key);
        if bucket.newest_entry.map_or(true, |newest| newest < expires_at) {
            bucket.newest_entry = Some(expires_at);
        }
        id as u8
    }

    /// Unregisters `key` from bucket `bucket_id`. The bucket's
    /// `newest_entry` is left as-is; an overestimate only delays one drain.
    pub fn detach(&mut self, key: &K, bucket_id: u8) {
        self.buckets[bucket_id as usize].entries.remove(key);
    }

    /// Steps the cleanup cursor and returns the index of the bucket whose
    /// turn has come, with the expiry time of its newest entry.
    pub fn advance(&mut self) -> (usize, Option<Instant>) {
        let index = self.next_cleanup;
        self.next_cleanup = (index + 1) % NUM_BUCKETS;
        (index, self.buckets[index].newest_entry)
    }

    /// Drains bucket `index`, returning every key it held.
    pub fn take(&mut self, index: usize) -> FxHashSet<K> {
        let bucket = &mut self.buckets[index];
        bucket.newest_entry = None;
        std::mem::take(&mut bucket.entries)
    }

    /// Empties every bucket and rewinds the cursor.
    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            bucket.entries.clear();
            bucket.newest_entry = None;
        }
        self.next_cleanup = 0;
    }

    /// Total number of registered keys, across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    /// Returns `true` when no keys are registered.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.entries.is_empty())
    }
}

impl<K> Default for BucketWheel<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
