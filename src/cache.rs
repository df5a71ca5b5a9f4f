//! Thread-safe cache façade over the policy engines.
//!
//! [`Cache`] wraps a policy engine in a single exclusive mutex and owns the
//! background expiration worker. The two public shapes are the type aliases
//! [`S3FifoCache`] and [`SieveCache`].
//!
//! ## Locking
//!
//! Every operation takes the one mutex, including `get`: both policies
//! mutate access metadata on a hit (a frequency counter or a visited bit),
//! so shared readers would race. A reader-writer lock is deliberately not
//! used here.
//!
//! ## Expiration
//!
//! With a non-zero `ttl`, construction spawns a worker that ticks every
//! `ttl / 100` and drains one wheel bucket per tick. When the bucket's
//! newest entry has not expired yet, the worker releases the lock, waits out
//! the remainder (interruptibly), reacquires, and finishes the drain. The
//! worker stops on [`Cache::close`] and never outlives the cache.
//!
//! ## Callbacks
//!
//! The callback installed via [`Cache::set_on_evicted`] runs while the lock
//! is held, in the thread that triggered the removal. It must not call back
//! into the cache; doing so would deadlock.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//!
//! use fifokit::cache::S3FifoCache;
//!
//! let cache: S3FifoCache<String, i32> = S3FifoCache::new(100, Duration::ZERO);
//!
//! cache.set("hot".to_string(), 1);
//! assert_eq!(cache.get(&"hot".to_string()), Some(1));
//! assert_eq!(cache.len(), 1);
//!
//! cache.close();
//! ```

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::ds::NUM_BUCKETS;
use crate::error::ConfigError;
use crate::policy::s3_fifo::S3FifoCore;
use crate::policy::sieve::SieveCore;
use crate::traits::{EvictReason, EvictionPolicy};

/// State shared between the façade and the expiration worker.
struct Shared<P> {
    core: Mutex<P>,
    stopped: Mutex<bool>,
    stop_signal: Condvar,
}

/// Thread-safe cache generic over its eviction policy engine.
///
/// Use the [`S3FifoCache`] / [`SieveCache`] aliases and their constructors
/// rather than naming the engine type directly.
pub struct Cache<K, V, P: EvictionPolicy<K, V>> {
    shared: Arc<Shared<P>>,
    expirer: Mutex<Option<JoinHandle<()>>>,
    _marker: PhantomData<fn(K, V)>,
}

/// Cache using the S3-FIFO eviction policy.
pub type S3FifoCache<K, V> = Cache<K, V, S3FifoCore<K, V>>;

/// Cache using the SIEVE eviction policy.
pub type SieveCache<K, V> = Cache<K, V, SieveCore<K, V>>;

impl<K, V> S3FifoCache<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// Creates an S3-FIFO cache holding up to `size` entries. A `ttl` of
    /// zero disables expiration; otherwise entries expire `ttl` after their
    /// last `set` and the background worker starts.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use fifokit::cache::S3FifoCache;
    ///
    /// let cache: S3FifoCache<u64, &str> = S3FifoCache::new(10, Duration::ZERO);
    /// cache.set(1, "one");
    /// assert!(cache.contains(&1));
    /// ```
    pub fn new(size: usize, ttl: Duration) -> Self {
        Self::try_new(size, ttl).expect("cache size must be greater than zero")
    }

    /// Fallible variant of [`new`](Self::new).
    pub fn try_new(size: usize, ttl: Duration) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::new("cache size must be greater than zero"));
        }
        Ok(Self::start(S3FifoCore::new(size, ttl), ttl))
    }
}

impl<K, V> SieveCache<K, V>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// Creates a SIEVE cache holding up to `size` entries. A `ttl` of zero
    /// disables expiration; otherwise entries expire `ttl` after their last
    /// `set` and the background worker starts.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use fifokit::cache::SieveCache;
    ///
    /// let cache: SieveCache<u64, &str> = SieveCache::new(10, Duration::ZERO);
    /// cache.set(1, "one");
    /// assert_eq!(cache.get(&1), Some("one"));
    /// ```
    pub fn new(size: usize, ttl: Duration) -> Self {
        Self::try_new(size, ttl).expect("cache size must be greater than zero")
    }

    /// Fallible variant of [`new`](Self::new).
    pub fn try_new(size: usize, ttl: Duration) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::new("cache size must be greater than zero"));
        }
        Ok(Self::start(SieveCore::new(size, ttl), ttl))
    }
}

impl<K, V, P> Cache<K, V, P>
where
    K: Send + 'static,
    V: Send + 'static,
    P: EvictionPolicy<K, V> + Send + 'static,
{
    /// Wraps `core` and spawns the expiration worker when `ttl` is non-zero.
    fn start(core: P, ttl: Duration) -> Self {
        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            stopped: Mutex::new(false),
            stop_signal: Condvar::new(),
        });
        let expirer = if ttl.is_zero() {
            None
        } else {
            // Floor the tick so a sub-microsecond ttl cannot busy-spin.
            let tick = (ttl / NUM_BUCKETS as u32).max(Duration::from_micros(50));
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name("fifokit-expirer".into())
                .spawn(move || expirer_loop::<K, V, P>(worker_shared, tick))
                .expect("failed to spawn the expiration worker");
            Some(handle)
        };
        Self {
            shared,
            expirer: Mutex::new(expirer),
            _marker: PhantomData,
        }
    }
}

impl<K, V, P> Cache<K, V, P>
where
    P: EvictionPolicy<K, V>,
{
    /// Inserts or updates `key`. Entries may be displaced (reported to the
    /// callback with [`EvictReason::Evicted`]) to stay within capacity.
    pub fn set(&self, key: K, value: V) {
        self.shared.core.lock().set(key, value);
    }

    /// Returns a clone of the value for `key`, updating the policy's access
    /// metadata. For non-cloneable values use [`get_with`](Self::get_with).
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use fifokit::cache::SieveCache;
    ///
    /// let cache: SieveCache<&str, i32> = SieveCache::new(10, Duration::ZERO);
    /// cache.set("key", 42);
    /// assert_eq!(cache.get(&"key"), Some(42));
    /// assert_eq!(cache.get(&"missing"), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shared.core.lock().get(key).cloned()
    }

    /// Applies `f` to the value for `key` under the lock, updating the
    /// policy's access metadata.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use fifokit::cache::S3FifoCache;
    ///
    /// let cache: S3FifoCache<&str, Vec<u8>> = S3FifoCache::new(10, Duration::ZERO);
    /// cache.set("blob", vec![1, 2, 3]);
    /// assert_eq!(cache.get_with(&"blob", |v| v.len()), Some(3));
    /// ```
    pub fn get_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let mut core = self.shared.core.lock();
        core.get(key).map(f)
    }

    /// Returns a clone of the value for `key` without updating any policy
    /// metadata.
    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.shared.core.lock().peek(key).cloned()
    }

    /// Applies `f` to the value for `key` under the lock without updating
    /// any policy metadata.
    pub fn peek_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        let core = self.shared.core.lock();
        core.peek(key).map(f)
    }

    /// Returns `true` if `key` is cached, without updating any policy
    /// metadata.
    pub fn contains(&self, key: &K) -> bool {
        self.shared.core.lock().contains(key)
    }

    /// Removes `key`, reporting [`EvictReason::Removed`] to the callback.
    /// Returns `false` if the key was absent.
    pub fn remove(&self, key: &K) -> bool {
        self.shared.core.lock().remove(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.shared.core.lock().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.shared.core.lock().capacity()
    }

    /// Drops every entry, reporting [`EvictReason::Removed`] for each.
    pub fn purge(&self) {
        self.shared.core.lock().purge();
    }

    /// Installs the eviction callback.
    ///
    /// The callback receives the owned key, the owned value, and the
    /// [`EvictReason`]. It runs while the cache lock is held and must not
    /// call back into the cache.
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::{Arc, Mutex};
    /// use std::time::Duration;
    ///
    /// use fifokit::cache::SieveCache;
    /// use fifokit::traits::EvictReason;
    ///
    /// let cache: SieveCache<u32, u32> = SieveCache::new(2, Duration::ZERO);
    /// let log = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&log);
    /// cache.set_on_evicted(move |key, _value, reason| {
    ///     sink.lock().unwrap().push((key, reason));
    /// });
    ///
    /// cache.set(1, 1);
    /// cache.set(2, 2);
    /// cache.set(3, 3); // displaces key 1
    ///
    /// assert_eq!(log.lock().unwrap().as_slice(), &[(1, EvictReason::Evicted)]);
    /// ```
    pub fn set_on_evicted(&self, callback: impl FnMut(K, V, EvictReason) + Send + 'static) {
        self.shared
            .core
            .lock()
            .set_on_evicted(Some(Box::new(callback)));
    }

    /// Purges every entry (reason [`EvictReason::Removed`]), then stops and
    /// joins the expiration worker. Safe to call more than once; later calls
    /// are no-ops. Dropping the cache closes it implicitly.
    pub fn close(&self) {
        self.purge();
        {
            let mut stopped = self.shared.stopped.lock();
            *stopped = true;
        }
        self.shared.stop_signal.notify_all();
        if let Some(handle) = self.expirer.lock().take() {
            let _ = handle.join();
        }
    }
}

impl<K, V, P> Drop for Cache<K, V, P>
where
    P: EvictionPolicy<K, V>,
{
    fn drop(&mut self) {
        self.close();
    }
}

impl<K, V, P> fmt::Debug for Cache<K, V, P>
where
    P: EvictionPolicy<K, V>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("Cache")
            .field("len", &core.len())
            .field("capacity", &core.capacity())
            .finish_non_exhaustive()
    }
}

/// Background worker: one wheel bucket per tick, sleeping out the remainder
/// when the bucket's newest entry has not expired yet. All waits go through
/// the stop condvar so `close` interrupts them promptly.
fn expirer_loop<K, V, P>(shared: Arc<Shared<P>>, tick: Duration)
where
    P: EvictionPolicy<K, V>,
{
    loop {
        {
            let mut stopped = shared.stopped.lock();
            if *stopped {
                return;
            }
            shared.stop_signal.wait_for(&mut stopped, tick);
            if *stopped {
                return;
            }
        }

        let mut core = shared.core.lock();
        let (index, newest) = core.next_expiry_bucket();
        if let Some(newest) = newest {
            let now = Instant::now();
            if newest > now {
                // Release the cache lock while waiting for the bucket's
                // newest entry to actually expire.
                drop(core);
                let mut stopped = shared.stopped.lock();
                if *stopped {
                    return;
                }
                shared.stop_signal.wait_for(&mut stopped, newest - now);
                if *stopped {
                    return;
                }
                drop(stopped);
                core = shared.core.lock();
            }
        }
        core.expire_bucket(index);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    const NO_TTL: Duration = Duration::ZERO;

    #[test]
    fn facade_round_trip_both_policies() {
        let s3: S3FifoCache<u32, u32> = S3FifoCache::new(10, NO_TTL);
        let sieve: SieveCache<u32, u32> = SieveCache::new(10, NO_TTL);

        for i in 0..10 {
            s3.set(i, i * 2);
            sieve.set(i, i * 2);
        }
        for i in 0..10 {
            assert_eq!(s3.get(&i), Some(i * 2));
            assert_eq!(sieve.get(&i), Some(i * 2));
        }
        assert_eq!(s3.len(), 10);
        assert_eq!(sieve.len(), 10);
        assert_eq!(s3.capacity(), 10);
        assert_eq!(sieve.capacity(), 10);
    }

    #[test]
    fn try_new_rejects_zero_size() {
        assert!(S3FifoCache::<u32, u32>::try_new(0, NO_TTL).is_err());
        assert!(SieveCache::<u32, u32>::try_new(0, NO_TTL).is_err());
    }

    #[test]
    #[should_panic(expected = "cache size must be greater than zero")]
    fn new_panics_on_zero_size() {
        let _cache: S3FifoCache<u32, u32> = S3FifoCache::new(0, NO_TTL);
    }

    #[test]
    fn get_with_and_peek_with_borrow_values() {
        let cache: SieveCache<&str, String> = SieveCache::new(4, NO_TTL);
        cache.set("key", "value".to_string());

        assert_eq!(cache.get_with(&"key", |v| v.len()), Some(5));
        assert_eq!(cache.peek_with(&"key", |v| v.to_uppercase()), Some("VALUE".to_string()));
        assert_eq!(cache.get_with(&"missing", |v| v.len()), None);
    }

    #[test]
    fn close_is_idempotent() {
        let cache: S3FifoCache<u32, u32> = S3FifoCache::new(4, Duration::from_secs(1));
        cache.set(1, 1);
        cache.close();
        assert_eq!(cache.len(), 0);
        cache.close();
        cache.close();
    }

    #[test]
    fn close_purges_with_removed_reason() {
        let cache: SieveCache<u32, u32> = SieveCache::new(4, NO_TTL);
        let removed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&removed);
        cache.set_on_evicted(move |_k, _v, reason| {
            assert_eq!(reason, EvictReason::Removed);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        cache.set(1, 1);
        cache.set(2, 2);
        cache.close();
        assert_eq!(removed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn drop_stops_the_worker() {
        // Construct with a ttl so a worker exists, then drop immediately.
        // The join in close() would hang if the stop signal were lost.
        let cache: S3FifoCache<u32, u32> = S3FifoCache::new(4, Duration::from_secs(30));
        cache.set(1, 1);
        drop(cache);
    }

    #[test]
    fn facade_is_shareable_across_threads() {
        let cache = Arc::new(S3FifoCache::<u32, u32>::new(64, NO_TTL));
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let key = t * 1000 + i;
                    cache.set(key, key);
                    cache.get(&key);
                    assert!(cache.len() <= 64);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 64);
    }
}
