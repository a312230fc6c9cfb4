//! 协调后端上的片段缓存索引
//!
//! 多进程部署时 sled 只能被一个进程打开，索引改存协调后端（`cache:{指纹}` → 产物路径），
//! 所有 worker 共享命中；音频文件仍在共享的 segments 目录

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{
    AudioFormat, CacheError, CacheStats, CoordinationError, CoordinationPort, SegmentCachePort,
};

pub const SHARED_CACHE_PREFIX: &str = "cache:";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SharedCacheEntry {
    path: String,
    created_at: i64,
}

/// 共享片段缓存
pub struct SharedSegmentCache {
    coordination: Arc<dyn CoordinationPort>,
    segments_dir: PathBuf,
    format: AudioFormat,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SharedSegmentCache {
    pub fn new(
        coordination: Arc<dyn CoordinationPort>,
        segments_dir: impl Into<PathBuf>,
        format: AudioFormat,
    ) -> Result<Self, CacheError> {
        let segments_dir = segments_dir.into();
        std::fs::create_dir_all(&segments_dir).map_err(|e| CacheError::IoError(e.to_string()))?;
        tracing::info!(
            backend = coordination.backend_name(),
            segments_dir = %segments_dir.display(),
            "SharedSegmentCache initialized"
        );
        Ok(Self {
            coordination,
            segments_dir,
            format,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    fn key(cache_key: &str) -> String {
        format!("{}{}", SHARED_CACHE_PREFIX, cache_key)
    }
}

fn backend(e: CoordinationError) -> CacheError {
    CacheError::DatabaseError(e.to_string())
}

#[async_trait]
impl SegmentCachePort for SharedSegmentCache {
    async fn get(&self, cache_key: &str) -> Result<Option<PathBuf>, CacheError> {
        let key = Self::key(cache_key);
        let Some(raw) = self.coordination.get(&key).await.map_err(backend)? else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let entry: SharedCacheEntry = serde_json::from_str(&raw)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        let path = PathBuf::from(&entry.path);
        if !path.exists() {
            self.coordination.delete(&key).await.map_err(backend)?;
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(cache_key = %cache_key, "Cached artifact missing, entry dropped");
            return Ok(None);
        }

        self.hit_count.fetch_add(1, Ordering::Relaxed);
        Ok(Some(path))
    }

    async fn set(&self, cache_key: &str, path: &Path) -> Result<(), CacheError> {
        let entry = SharedCacheEntry {
            path: path.to_string_lossy().into_owned(),
            created_at: Utc::now().timestamp(),
        };
        let raw = serde_json::to_string(&entry)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        self.coordination
            .set(&Self::key(cache_key), &raw, None)
            .await
            .map_err(backend)?;
        tracing::debug!(cache_key = %cache_key, path = %entry.path, "Segment cached");
        Ok(())
    }

    fn segment_path(&self, cache_key: &str) -> PathBuf {
        self.segments_dir
            .join(format!("{}.{}", cache_key, self.format.extension()))
    }

    async fn stats(&self) -> CacheStats {
        let total_entries = match self.coordination.scan_keys(SHARED_CACHE_PREFIX).await {
            Ok(keys) => keys.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count cache entries");
                0
            }
        };
        CacheStats {
            total_entries,
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
