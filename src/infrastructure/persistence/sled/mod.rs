//! Sled 存储

mod segment_cache;

pub use segment_cache::{SledCacheConfig, SledSegmentCache};
