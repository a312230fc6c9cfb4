//! 调度器设置

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::ChunkConfig;

/// 模型别名
pub const DEFAULT_MODEL_ALIAS: &str = "default";
pub const QUALITY_MODEL_ALIAS: &str = "quality";

/// 调度器设置
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_text_chars: usize,
    pub max_segments: usize,
    pub max_active_jobs: usize,
    pub chunk: ChunkConfig,
    /// 同一片段允许的重试次数（总尝试次数 = max_retries + 1）
    pub segment_max_retries: u32,
    pub segment_stale_secs: u64,
    /// 排队无人认领超过此时长的任务会被回收（需要有在线 worker）
    pub stale_queued_secs: u64,
    pub stale_queued_require_workers: bool,
    /// 超过此时长无论是否有 worker 在线都回收
    pub stale_queued_abandoned_secs: u64,
    pub jobs_ttl: Duration,
    pub max_workers: usize,
    pub max_concurrent_segments: usize,
    pub per_job_workers: usize,
    pub require_workers: bool,
    pub default_model: String,
    pub quality_model: String,
    pub model_allowlist: Vec<String>,
    pub compiler_version: String,
    pub synth_acquire_timeout: Duration,
    pub public_segment_base_url: String,
    pub merge_lock_wait: Duration,
    pub claim_ttl: Duration,
    /// 合并产物目录，每个任务一个子目录
    pub segments_dir: PathBuf,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let max_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(4);
        let default_model = "tts_models/en/ljspeech/tacotron2-DDC_ph".to_string();
        let quality_model = "tts_models/en/ljspeech/vits".to_string();
        Self {
            max_text_chars: 20_000,
            max_segments: 120,
            max_active_jobs: 20,
            chunk: ChunkConfig::default(),
            segment_max_retries: 2,
            segment_stale_secs: 300,
            stale_queued_secs: 3600,
            stale_queued_require_workers: true,
            stale_queued_abandoned_secs: 86_400,
            jobs_ttl: Duration::from_secs(24 * 3600),
            max_workers,
            max_concurrent_segments: 1,
            per_job_workers: 1,
            require_workers: true,
            model_allowlist: vec![default_model.clone(), quality_model.clone()],
            default_model,
            quality_model,
            compiler_version: "1.0.0".to_string(),
            synth_acquire_timeout: Duration::from_secs(30),
            public_segment_base_url: "/api/tts".to_string(),
            merge_lock_wait: Duration::from_secs(1),
            claim_ttl: Duration::from_secs(60),
            segments_dir: PathBuf::from("data/cache/segments"),
        }
    }
}

impl SchedulerSettings {
    /// 单个任务的片段并发度
    ///
    /// 限制在 [1, min(max_workers, max_concurrent_segments)]
    pub fn per_job_width(&self) -> usize {
        let cap = self.max_workers.min(self.max_concurrent_segments).max(1);
        self.per_job_workers.clamp(1, cap)
    }

    /// 解析模型别名，未指定时使用默认模型
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim).filter(|m| !m.is_empty()) {
            None | Some(DEFAULT_MODEL_ALIAS) => self.default_model.clone(),
            Some(QUALITY_MODEL_ALIAS) => self.quality_model.clone(),
            Some(model) => model.to_string(),
        }
    }

    pub fn is_model_allowed(&self, model_id: &str) -> bool {
        self.model_allowlist.iter().any(|m| m == model_id)
    }
}
