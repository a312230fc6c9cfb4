//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现

pub mod adapters;
pub mod http;
pub mod memory;
pub mod persistence;
pub mod redis;
pub mod worker;

pub use memory::InMemoryCoordination;
pub use persistence::{FileDictStore, SharedSegmentCache, SledCacheConfig, SledSegmentCache};
pub use redis::{RedisCoordination, RedisCoordinationConfig};
pub use worker::{JobWorker, JobWorkerConfig};
