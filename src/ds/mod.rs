//! Internal data structures backing the cache policies.

pub mod bucket_wheel;
pub mod ghost;
pub mod key_ring;
pub mod node_list;

pub use bucket_wheel::{BucketWheel, NUM_BUCKETS};
pub use ghost::GhostSet;
pub use key_ring::KeyRing;
pub use node_list::{ListNode, NodeList};
