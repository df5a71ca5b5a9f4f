//! # Cache Policy Contract
//!
//! This module defines the uniform operation surface shared by the S3-FIFO and
//! SIEVE policy engines, plus the eviction-reporting types exposed to users.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────────────┐
//!                    │          EvictionPolicy<K, V>            │
//!                    │                                          │
//!                    │  set(&mut, K, V)                         │
//!                    │  get(&mut, &K) → Option<&V>              │
//!                    │  peek(&, &K) → Option<&V>                │
//!                    │  contains(&, &K) → bool                  │
//!                    │  remove(&mut, &K) → bool                 │
//!                    │  len(&) / capacity(&)                    │
//!                    │  purge(&mut)                             │
//!                    │  set_on_evicted(&mut, cb)                │
//!                    │  next_expiry_bucket / expire_bucket      │
//!                    └──────────────────┬───────────────────────┘
//!                                       │
//!                     ┌─────────────────┴─────────────────┐
//!                     ▼                                   ▼
//!        ┌─────────────────────────┐       ┌─────────────────────────┐
//!        │   S3FifoCore<K, V>      │       │    SieveCore<K, V>      │
//!        │   small / main / ghost  │       │    list / hand / bits   │
//!        └─────────────────────────┘       └─────────────────────────┘
//! ```
//!
//! ## Trait Design
//!
//! Each engine owns its internal structures completely; there is no shared
//! base type with protected state. The [`Cache`](crate::cache::Cache) façade
//! is generic over this trait, keeps the engine behind one exclusive mutex,
//! and drives `next_expiry_bucket`/`expire_bucket` from the background
//! expiration worker.
//!
//! `get` is a mutator on both engines (it bumps a frequency counter or sets a
//! visited bit), which is why the trait takes `&mut self` and why the façade
//! uses an exclusive lock rather than a reader-writer lock.

use std::time::Instant;

/// Why an entry left the cache, reported to the [`OnEvictCallback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictReason {
    /// The entry's time-to-live elapsed.
    Expired,
    /// The entry was displaced by capacity pressure.
    Evicted,
    /// The entry was removed explicitly (`remove`, `purge`, or `close`).
    Removed,
}

/// Callback invoked with the owned key, value, and reason whenever an entry
/// leaves the cache.
///
/// The callback runs while the cache lock is held, in the thread that
/// triggered the removal. It must not call back into the cache.
pub type OnEvictCallback<K, V> = Box<dyn FnMut(K, V, EvictReason) + Send>;

/// Uniform operation surface implemented by each eviction policy engine.
///
/// Implementations maintain these invariants after every call returns:
///
/// - the key→node index and the node list(s) describe exactly the same set
///   of entries;
/// - `len() <= capacity()`, with evictions performed before inserts;
/// - policy metadata stays within its domain (`freq` saturates at 3, the
///   visited bit is a plain flag).
pub trait EvictionPolicy<K, V> {
    /// Inserts or updates `key`. May displace other entries (reporting
    /// [`EvictReason::Evicted`]) to stay within capacity.
    fn set(&mut self, key: K, value: V);

    /// Looks up `key`, updating the policy's access metadata on a hit.
    fn get(&mut self, key: &K) -> Option<&V>;

    /// Looks up `key` without touching any policy metadata.
    fn peek(&self, key: &K) -> Option<&V>;

    /// Returns `true` if `key` is cached, without touching policy metadata.
    fn contains(&self, key: &K) -> bool;

    /// Removes `key`, reporting [`EvictReason::Removed`]. Returns `false`
    /// if the key was absent.
    fn remove(&mut self, key: &K) -> bool;

    /// Number of cached entries. Ghost entries are never counted.
    fn len(&self) -> usize;

    /// Returns `true` if the cache holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    fn capacity(&self) -> usize;

    /// Drops every entry, reporting [`EvictReason::Removed`] for each.
    fn purge(&mut self);

    /// Installs (or clears) the eviction callback.
    fn set_on_evicted(&mut self, callback: Option<OnEvictCallback<K, V>>);

    /// Advances the expiration cursor and returns the bucket to drain next
    /// together with the expiry time of its newest entry, if any.
    fn next_expiry_bucket(&mut self) -> (usize, Option<Instant>);

    /// Drains bucket `index`, removing every entry it holds with reason
    /// [`EvictReason::Expired`].
    fn expire_bucket(&mut self, index: usize);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evict_reason_is_copy_eq_hash() {
        use std::collections::HashSet;

        let mut reasons = HashSet::new();
        reasons.insert(EvictReason::Expired);
        reasons.insert(EvictReason::Evicted);
        reasons.insert(EvictReason::Removed);
        assert_eq!(reasons.len(), 3);

        let r = EvictReason::Evicted;
        let copy = r;
        assert_eq!(r, copy);
    }
}
