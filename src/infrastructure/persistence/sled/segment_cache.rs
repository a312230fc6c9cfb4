//! Sled-based Segment Cache Implementation
//!
//! sled 中只保存 指纹 → 产物路径 的映射，音频文件本身存放在 segments 目录

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{AudioFormat, CacheError, CacheStats, SegmentCachePort};

const CACHE_PREFIX: &str = "cache:";

/// Sled 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: String,
    /// 片段音频目录
    pub segments_dir: PathBuf,
    /// 产物格式（决定扩展名）
    pub format: AudioFormat,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: "data/cache/index.sled".to_string(),
            segments_dir: PathBuf::from("data/cache/segments"),
            format: AudioFormat::default(),
        }
    }
}

/// 内部缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalCacheEntry {
    path: String,
    created_at: i64,
}

/// Sled 片段缓存
pub struct SledSegmentCache {
    db: Db,
    segments_dir: PathBuf,
    format: AudioFormat,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SledSegmentCache {
    /// 创建新的缓存实例
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&config.segments_dir)
            .map_err(|e| CacheError::IoError(e.to_string()))?;
        let db = sled::open(&config.db_path)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        tracing::info!(
            db_path = %config.db_path,
            segments_dir = %config.segments_dir.display(),
            entries = db.scan_prefix(CACHE_PREFIX).count(),
            "SledSegmentCache initialized"
        );

        Ok(Self {
            db,
            segments_dir: config.segments_dir.clone(),
            format: config.format,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn db_key(cache_key: &str) -> String {
        format!("{}{}", CACHE_PREFIX, cache_key)
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db
            .flush()
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SegmentCachePort for SledSegmentCache {
    async fn get(&self, cache_key: &str) -> Result<Option<PathBuf>, CacheError> {
        let key = Self::db_key(cache_key);

        let data = match self.db.get(&key) {
            Ok(Some(data)) => data,
            Ok(None) => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(CacheError::DatabaseError(e.to_string())),
        };

        let entry: InternalCacheEntry = bincode::deserialize(&data)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        let path = PathBuf::from(&entry.path);
        if !path.exists() {
            // 产物被外部删除，映射失效
            self.db
                .remove(&key)
                .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache_key = %cache_key, "Cached artifact missing, entry dropped");
            return Ok(None);
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Ok(Some(path))
    }

    async fn set(&self, cache_key: &str, path: &Path) -> Result<(), CacheError> {
        let entry = InternalCacheEntry {
            path: path.to_string_lossy().into_owned(),
            created_at: Utc::now().timestamp(),
        };
        let entry_bytes =
            bincode::serialize(&entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;

        self.db
            .insert(Self::db_key(cache_key), entry_bytes)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        tracing::debug!(cache_key = %cache_key, path = %entry.path, "Segment cached");
        Ok(())
    }

    fn segment_path(&self, cache_key: &str) -> PathBuf {
        self.segments_dir
            .join(format!("{}.{}", cache_key, self.format.extension()))
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.db.scan_prefix(CACHE_PREFIX).count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
