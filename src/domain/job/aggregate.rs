//! Job Context - Aggregate Root

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{
    round3, JobErrorCode, JobProgress, JobStatus, SegmentErrorCode, SegmentStatus, SegmentTimings,
};

/// 生成不带连字符的 uuid
pub fn new_hex_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 片段
///
/// index 决定最终播放顺序，生命周期与所属 Job 相同
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_id: String,
    pub index: usize,
    pub text: String,
    pub normalized_text: String,
    pub cache_key: String,
    pub status: SegmentStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timings: Option<SegmentTimings>,
    #[serde(default)]
    pub resolved_phonemes: Option<String>,
    #[serde(default)]
    pub used_phonemes: bool,
    #[serde(default)]
    pub resolve_source_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub attempted_models: Vec<String>,
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub stale_requeues: u32,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<SegmentErrorCode>,
}

impl Segment {
    /// 创建排队中的片段
    pub fn new(
        index: usize,
        text: impl Into<String>,
        normalized_text: impl Into<String>,
        cache_key: impl Into<String>,
    ) -> Self {
        Self {
            segment_id: new_hex_id(),
            index,
            text: text.into(),
            normalized_text: normalized_text.into(),
            cache_key: cache_key.into(),
            status: SegmentStatus::Queued,
            attempts: 0,
            path: None,
            started_at: None,
            timings: None,
            resolved_phonemes: None,
            used_phonemes: false,
            resolve_source_counts: BTreeMap::new(),
            attempted_models: Vec::new(),
            fallback_used: false,
            stale_requeues: 0,
            error: None,
            error_code: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 已有可播放产物
    pub fn is_ready(&self) -> bool {
        self.status == SegmentStatus::Ready || self.path.is_some()
    }

    /// 缓存命中：直接就绪，耗时清零
    pub fn mark_cached(&mut self, path: String) {
        self.status = SegmentStatus::Ready;
        self.path = Some(path);
        self.started_at = None;
        self.timings = Some(SegmentTimings::default());
        self.resolved_phonemes = None;
        self.used_phonemes = false;
        self.error = None;
        self.error_code = None;
    }

    pub fn mark_ready(&mut self, path: String) {
        self.status = SegmentStatus::Ready;
        self.path = Some(path);
        self.started_at = None;
        self.error = None;
        self.error_code = None;
    }

    pub fn mark_error(&mut self, code: SegmentErrorCode, message: impl Into<String>) {
        self.status = SegmentStatus::Error;
        self.started_at = None;
        self.error = Some(message.into());
        self.error_code = Some(code);
    }
}

/// Job 聚合根
///
/// 不变量:
/// - 片段 index 唯一、从 0 连续
/// - 状态单调流转，终态不再变化
/// - dict_versions 在创建时固定，之后的词典写入不影响已排队片段的缓存 key
/// - 准入名额只释放一次（active_job_released）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub canceled_at: Option<DateTime<Utc>>,
    pub text: String,
    pub normalized_text: String,
    pub model_id: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub effective_voice_id: Option<String>,
    /// 阅读配置，原样透传，不参与指纹
    #[serde(default)]
    pub reading_profile: Option<serde_json::Value>,
    #[serde(default = "default_prefer_phonemes")]
    pub prefer_phonemes: bool,
    #[serde(default)]
    pub dict_versions: BTreeMap<String, String>,
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub chars_total: usize,
    #[serde(default)]
    pub cache_hit_count: u64,
    #[serde(default)]
    pub cache_miss_count: u64,
    #[serde(default)]
    pub phoneme_segment_count: u64,
    #[serde(default)]
    pub used_phoneme_segment_count: u64,
    #[serde(default)]
    pub error_segment_count: u64,
    #[serde(default)]
    pub timing_total_ms: Option<f64>,
    #[serde(default)]
    pub chars_per_sec: Option<f64>,
    #[serde(default)]
    pub active_job_released: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<JobErrorCode>,
}

fn default_prefer_phonemes() -> bool {
    true
}

/// 创建 Job 所需参数
#[derive(Debug, Clone)]
pub struct NewJob {
    pub text: String,
    pub normalized_text: String,
    pub model_id: String,
    pub voice_id: Option<String>,
    pub effective_voice_id: Option<String>,
    pub reading_profile: Option<serde_json::Value>,
    pub prefer_phonemes: bool,
    pub dict_versions: BTreeMap<String, String>,
}

impl Job {
    /// 创建排队中的任务
    pub fn new(params: NewJob, segments: Vec<Segment>) -> Self {
        let now = Utc::now();
        let chars_total = segments.iter().map(|s| s.text.chars().count()).sum();
        Self {
            job_id: new_hex_id(),
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            canceled_at: None,
            text: params.text,
            normalized_text: params.normalized_text,
            model_id: params.model_id,
            voice_id: params.voice_id,
            effective_voice_id: params.effective_voice_id,
            reading_profile: params.reading_profile,
            prefer_phonemes: params.prefer_phonemes,
            dict_versions: params.dict_versions,
            segments,
            chars_total,
            cache_hit_count: 0,
            cache_miss_count: 0,
            phoneme_segment_count: 0,
            used_phoneme_segment_count: 0,
            error_segment_count: 0,
            timing_total_ms: None,
            chars_per_sec: None,
            active_job_released: false,
            error: None,
            error_code: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_canceled(&self) -> bool {
        self.status == JobStatus::Canceled
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn segment(&self, segment_id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.segment_id == segment_id)
    }

    pub fn segment_mut(&mut self, segment_id: &str) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.segment_id == segment_id)
    }

    /// 尚未终结的片段 ID（按 index 顺序）
    pub fn pending_segment_ids(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.segment_id.clone())
            .collect()
    }

    /// 已就绪片段，按 index 排序
    pub fn ready_segments(&self) -> Vec<&Segment> {
        let mut ready: Vec<&Segment> = self
            .segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Ready && s.path.is_some())
            .collect();
        ready.sort_by_key(|s| s.index);
        ready
    }

    /// 进入处理中状态
    ///
    /// 只有 queued / in_progress 的任务可以进入
    pub fn mark_in_progress(&mut self) -> bool {
        match self.status {
            JobStatus::Queued | JobStatus::InProgress => {
                self.status = JobStatus::InProgress;
                true
            }
            _ => false,
        }
    }

    /// 取消任务
    ///
    /// 终态任务不受影响，返回是否发生了状态变化
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Canceled;
        self.canceled_at = Some(Utc::now());
        for segment in self.segments.iter_mut() {
            if matches!(segment.status, SegmentStatus::Ready | SegmentStatus::Error) {
                continue;
            }
            segment.status = SegmentStatus::Canceled;
            segment.started_at = None;
            segment.error = Some("canceled".to_string());
            segment.error_code = Some(SegmentErrorCode::Canceled);
        }
        true
    }

    /// 回收过期的 synthesizing 片段
    ///
    /// started_at 缺失或超过 stale_secs 的片段重置为 queued，返回回收数量
    pub fn reset_stale_segments(&mut self, now: DateTime<Utc>, stale_secs: u64) -> usize {
        let mut reset = 0;
        for segment in self.segments.iter_mut() {
            if segment.status != SegmentStatus::Synthesizing {
                continue;
            }
            let stale = match segment.started_at {
                None => true,
                Some(started) => (now - started).num_milliseconds() > (stale_secs as i64) * 1000,
            };
            if stale {
                segment.status = SegmentStatus::Queued;
                segment.started_at = None;
                segment.stale_requeues += 1;
                reset += 1;
            }
        }
        reset
    }

    /// 汇总为终态
    ///
    /// 已终结（例如已取消）的任务保持不变
    pub fn finalize(&mut self, any_errors: bool, duration_secs: f64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = if any_errors {
            JobStatus::CompleteWithErrors
        } else {
            JobStatus::Complete
        };
        self.timing_total_ms = Some(round3(duration_secs * 1000.0));
        let cps = if duration_secs > 0.0 {
            self.chars_total as f64 / duration_secs
        } else {
            0.0
        };
        self.chars_per_sec = Some(round3(cps));
        true
    }

    /// 抢占释放标记
    ///
    /// 返回 true 表示调用方负责释放准入名额
    pub fn take_release(&mut self) -> bool {
        if self.active_job_released {
            return false;
        }
        self.active_job_released = true;
        true
    }

    /// 计算进度
    pub fn progress(&self) -> JobProgress {
        let total = self.segments.len();
        let ready = self.segments.iter().filter(|s| s.is_ready()).count();
        let error = self
            .segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Error)
            .count();
        let in_progress = total.saturating_sub(ready + error);
        let percent = if total > 0 {
            round3(ready as f64 / total as f64 * 100.0)
        } else {
            0.0
        };
        JobProgress {
            total,
            ready,
            error,
            in_progress,
            percent,
        }
    }
}
