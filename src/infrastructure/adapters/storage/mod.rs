//! Storage Adapter - 合并锁

mod merge_lock;

pub use merge_lock::{CoordinationMergeLock, FileMergeLock};
