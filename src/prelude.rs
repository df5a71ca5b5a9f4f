//! Convenience re-exports of the user-facing types.

pub use crate::builder::CacheBuilder;
pub use crate::cache::{Cache, S3FifoCache, SieveCache};
pub use crate::error::ConfigError;
pub use crate::traits::{EvictReason, EvictionPolicy, OnEvictCallback};
