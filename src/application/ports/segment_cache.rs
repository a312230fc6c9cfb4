//! Segment Cache Port - 片段缓存
//!
//! 内容寻址：指纹 → 音频产物路径，产物文件被外部删除时自动视为未命中

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Segment Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// Segment Cache Port
#[async_trait]
pub trait SegmentCachePort: Send + Sync {
    /// 查找缓存
    ///
    /// 只有映射存在且产物文件仍存在时返回路径
    async fn get(&self, cache_key: &str) -> Result<Option<PathBuf>, CacheError>;

    /// 写入映射（无条件覆盖）
    async fn set(&self, cache_key: &str, path: &std::path::Path) -> Result<(), CacheError>;

    /// 指纹对应的产物存放路径
    fn segment_path(&self, cache_key: &str) -> PathBuf;

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}

/// 计算片段指纹
///
/// md5(按 key 排序的 JSON)，字段只有：文本、模型、音色、词典版本、编译器版本。
/// 音色为空时序列化为 ""。
pub fn fingerprint(
    normalized_text: &str,
    model_id: &str,
    voice_id: Option<&str>,
    dict_versions: &BTreeMap<String, String>,
    compiler_version: &str,
) -> String {
    // serde_json::Map 默认按 key 排序
    let payload = serde_json::json!({
        "text": normalized_text,
        "model_id": model_id,
        "voice_id": voice_id.unwrap_or(""),
        "dict_versions": dict_versions,
        "compiler_version": compiler_version,
    });
    let digest = md5::compute(payload.to_string().as_bytes());
    format!("{:x}", digest)
}
