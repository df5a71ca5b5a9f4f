//! Eviction policy engines.

pub mod s3_fifo;
pub mod sieve;

pub use s3_fifo::S3FifoCore;
pub use sieve::SieveCore;
