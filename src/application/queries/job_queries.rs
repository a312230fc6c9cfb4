//! Job Queries - 任务查询

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::job::{Job, JobProgress, SegmentStatus};

/// 任务详情查询
#[derive(Debug, Clone)]
pub struct GetJob {
    pub job_id: String,
}

/// 任务详情（附带进度）
#[derive(Debug, Clone)]
pub struct JobView {
    pub job: Job,
    pub progress: JobProgress,
}

/// 单个片段音频查询
#[derive(Debug, Clone)]
pub struct GetSegmentAudio {
    pub job_id: String,
    pub segment_id: String,
}

/// 片段音频
#[derive(Debug, Clone)]
pub enum SegmentAudio {
    /// 片段存在但尚无产物
    Pending { status: SegmentStatus },
    Ready {
        path: PathBuf,
        cache_key: String,
        content_type: &'static str,
    },
}

/// 播放列表查询
#[derive(Debug, Clone)]
pub struct GetPlaylist {
    pub job_id: String,
    /// 客户端经由反向代理访问时优先给出代理地址
    pub prefer_proxy: bool,
}

/// 后端直连的片段地址前缀
pub const BACKEND_SEGMENT_BASE: &str = "/v1/tts";

/// 片段的两种访问地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUrls {
    /// 经由反向代理（public_segment_base_url）
    pub proxy: String,
    pub backend: String,
}

impl SegmentUrls {
    pub fn new(proxy_base: &str, job_id: &str, segment_id: &str) -> Self {
        let suffix = format!("/jobs/{}/segments/{}", job_id, segment_id);
        Self {
            proxy: format!("{}{}", proxy_base.trim_end_matches('/'), suffix),
            backend: format!("{}{}", BACKEND_SEGMENT_BASE, suffix),
        }
    }

    pub fn best(&self, prefer_proxy: bool) -> &str {
        if prefer_proxy {
            &self.proxy
        } else {
            &self.backend
        }
    }
}

/// 播放列表条目，按片段序号排列
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistEntry {
    pub index: usize,
    pub segment_id: String,
    pub status: SegmentStatus,
    pub url_proxy: String,
    pub url_backend: String,
    pub url_best: String,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Playlist {
    pub job_id: String,
    pub playlist: Vec<PlaylistEntry>,
}

/// 合并音频查询
#[derive(Debug, Clone)]
pub struct GetMergedAudio {
    pub job_id: String,
}

/// 调度器运行状态查询
#[derive(Debug, Clone, Default)]
pub struct GetStatus;

/// 指标查询
#[derive(Debug, Clone, Default)]
pub struct GetMetrics;

/// 可用模型查询
#[derive(Debug, Clone, Default)]
pub struct ListModels;

/// 白名单中的模型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelView {
    pub model_id: String,
    pub language: String,
    pub engine: String,
    pub is_default: bool,
    pub is_quality: bool,
}

/// 指标报告
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub total_jobs: u64,
    pub total_segments: u64,
    pub avg_chars_per_sec: f64,
    pub cache_hit_rate: f64,
    pub error_rate: f64,
    pub queue_len: usize,
    pub workers_online: usize,
    pub active_jobs: usize,
    pub segment_retries: u64,
    pub segment_retry_caps: u64,
    pub fallback_model_usage: u64,
    pub merge_lock_waits: u64,
    pub merge_lock_wait_ms: f64,
    pub merge_lock_wait_max_ms: f64,
    pub stale_queued_cancels: u64,
}
