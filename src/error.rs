//! Error types for the fifokit library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when cache configuration parameters are invalid
//!   (e.g. zero capacity).
//!
//! ## Example Usage
//!
//! ```
//! use std::time::Duration;
//!
//! use fifokit::cache::S3FifoCache;
//! use fifokit::error::ConfigError;
//!
//! // Fallible constructor for user-configurable parameters
//! let cache: Result<S3FifoCache<String, i32>, ConfigError> =
//!     S3FifoCache::try_new(100, Duration::ZERO);
//! assert!(cache.is_ok());
//!
//! // Zero capacity is caught without panicking
//! let bad = S3FifoCache::<String, i32>::try_new(0, Duration::ZERO);
//! assert!(bad.is_err());
//! ```

use std::fmt;

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by fallible constructors such as
/// [`S3FifoCache::try_new`](crate::cache::S3FifoCache::try_new) and the
/// [`CacheBuilder`](crate::builder::CacheBuilder) `build_*` methods. Carries a
/// human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use fifokit::cache::SieveCache;
///
/// let err = SieveCache::<u64, u64>::try_new(0, Duration::ZERO).unwrap_err();
/// assert!(err.to_string().contains("size"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}
