//! Builder for configuring cache parameters.
//!
//! A thin fluent layer over the [`Cache`](crate::cache::Cache) constructors
//! for call sites that assemble configuration incrementally.
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use fifokit::builder::CacheBuilder;
//!
//! let cache = CacheBuilder::new(100)
//!     .ttl(Duration::from_secs(60))
//!     .build_sieve::<u64, String>()
//!     .unwrap();
//!
//! cache.set(1, "hello".to_string());
//! assert_eq!(cache.get(&1), Some("hello".to_string()));
//! cache.close();
//! ```

use std::hash::Hash;
use std::time::Duration;

use crate::cache::{S3FifoCache, SieveCache};
use crate::error::ConfigError;

/// Fluent configuration for a cache instance.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    capacity: usize,
    ttl: Duration,
}

impl CacheBuilder {
    /// Starts a builder for a cache holding up to `capacity` entries, with
    /// expiration disabled.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ttl: Duration::ZERO,
        }
    }

    /// Sets the entry time-to-live. Zero disables expiration.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Builds an S3-FIFO cache with the configured parameters.
    pub fn build_s3fifo<K, V>(self) -> Result<S3FifoCache<K, V>, ConfigError>
    where
        K: Clone + Eq + Hash + Send + 'static,
        V: Send + 'static,
    {
        S3FifoCache::try_new(self.capacity, self.ttl)
    }

    /// Builds a SIEVE cache with the configured parameters.
    pub fn build_sieve<K, V>(self) -> Result<SieveCache<K, V>, ConfigError>
    where
        K: Clone + Eq + Hash + Send + 'static,
        V: Send + 'static,
    {
        SieveCache::try_new(self.capacity, self.ttl)
    }
}
