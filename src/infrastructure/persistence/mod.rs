//! Persistence Layer - 数据持久化
//!
//! 片段缓存索引（单进程 sled，多进程走协调后端）与词典包文件存储

mod dict_packs;
mod shared_cache;
pub mod sled;

pub use self::sled::{SledCacheConfig, SledSegmentCache};
pub use dict_packs::FileDictStore;
pub use shared_cache::SharedSegmentCache;
