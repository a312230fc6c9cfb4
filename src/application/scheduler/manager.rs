//! 任务管理器
//!
//! 负责任务提交、准入控制、取消与状态汇总；片段处理见 processing，合并见 merge

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use super::job_store::JobStore;
use super::settings::SchedulerSettings;
use super::synth_pool::SynthesizerPool;
use crate::application::error::{ApplicationError, SubmitError};
use crate::application::metrics::Metrics;
use crate::application::ports::{
    fingerprint, AudioEncoderPort, CoordinationPort, MergeLockPort,
    SegmentCachePort, SynthesizerFactory,
};
use crate::domain::job::{Job, JobErrorCode, JobStatus, NewJob, Segment};
use crate::domain::pronunciation::PronunciationResolver;
use crate::domain::{chunk_and_merge, normalize_text};

/// 任务队列名
pub const JOB_QUEUE: &str = "jobs";

/// 准入计数器名
pub const ACTIVE_JOBS_COUNTER: &str = "active_jobs";

/// worker 认领标记
pub fn claim_key(job_id: &str) -> String {
    format!("claim:{}", job_id)
}

/// 孤儿任务重新入队标记
pub fn requeue_key(job_id: &str) -> String {
    format!("requeue:{}", job_id)
}

const REQUEUE_MARK_TTL: Duration = Duration::from_secs(30);

/// 提交请求
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub text: String,
    /// 为空时使用默认模型，支持 default / quality 别名
    pub model_id: Option<String>,
    pub voice_id: Option<String>,
    pub reading_profile: Option<Value>,
    pub prefer_phonemes: bool,
}

impl JobRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model_id: None,
            voice_id: None,
            reading_profile: None,
            prefer_phonemes: true,
        }
    }
}

/// 调度器依赖
pub struct SchedulerDeps {
    pub coordination: Arc<dyn CoordinationPort>,
    pub cache: Arc<dyn SegmentCachePort>,
    pub resolver: Arc<PronunciationResolver>,
    pub synthesizers: Arc<dyn SynthesizerFactory>,
    pub encoder: Arc<dyn AudioEncoderPort>,
    pub merge_lock: Arc<dyn MergeLockPort>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryCounts {
    pub segment_retries: u64,
    pub retry_caps: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeLockContention {
    pub wait_count: u64,
    pub wait_total_ms: f64,
    pub wait_max_ms: f64,
}

/// 调度器运行状态
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub workers_online: usize,
    pub queue_len: usize,
    pub active_jobs: usize,
    pub retry_counts: RetryCounts,
    pub fallback_model_usage: u64,
    pub merge_lock_contention: MergeLockContention,
    pub stale_queued_cancels: u64,
}

/// 任务管理器
pub struct JobManager {
    pub(super) settings: SchedulerSettings,
    pub(super) coordination: Arc<dyn CoordinationPort>,
    pub(super) jobs: JobStore,
    pub(super) cache: Arc<dyn SegmentCachePort>,
    pub(super) resolver: Arc<PronunciationResolver>,
    pub(super) pool: SynthesizerPool,
    pub(super) encoder: Arc<dyn AudioEncoderPort>,
    pub(super) merge_lock: Arc<dyn MergeLockPort>,
    pub(super) metrics: Arc<Metrics>,
    /// 引擎不保证并发安全，进程内串行调用
    pub(super) synth_lock: AsyncMutex<()>,
}

impl JobManager {
    pub fn new(settings: SchedulerSettings, deps: SchedulerDeps) -> Self {
        let jobs = JobStore::new(deps.coordination.clone(), settings.jobs_ttl);
        let pool = SynthesizerPool::new(
            deps.synthesizers,
            settings.max_workers,
            settings.synth_acquire_timeout,
        );
        Self {
            settings,
            coordination: deps.coordination,
            jobs,
            cache: deps.cache,
            resolver: deps.resolver,
            pool,
            encoder: deps.encoder,
            merge_lock: deps.merge_lock,
            metrics: deps.metrics,
            synth_lock: AsyncMutex::new(()),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn resolver(&self) -> &Arc<PronunciationResolver> {
        &self.resolver
    }

    pub fn coordination(&self) -> &Arc<dyn CoordinationPort> {
        &self.coordination
    }

    pub fn encoder(&self) -> &Arc<dyn AudioEncoderPort> {
        &self.encoder
    }

    // ========== 提交 ==========

    /// 提交任务
    ///
    /// 校验失败时不创建任务、不占用准入名额
    pub async fn submit(&self, request: JobRequest) -> Result<Job, ApplicationError> {
        let model_id = self.settings.resolve_model(request.model_id.as_deref());
        if !self.settings.is_model_allowed(&model_id) {
            return Err(SubmitError::ModelNotAllowed {
                model: model_id,
                allowed: self.settings.model_allowlist.join(", "),
            }
            .into());
        }

        let text_len = request.text.chars().count();
        if text_len > self.settings.max_text_chars {
            return Err(SubmitError::TextTooLong {
                len: text_len,
                max: self.settings.max_text_chars,
            }
            .into());
        }

        if self.settings.require_workers
            && self.coordination.is_distributed()
            && self.workers_online().await == 0
        {
            return Err(SubmitError::NoWorkersOnline.into());
        }

        // 按原文分段以保留标点，缓存 key 使用逐段规范化后的文本
        let chunks = chunk_and_merge(&request.text, &self.settings.chunk);
        if chunks.is_empty() {
            return Err(SubmitError::EmptyText.into());
        }
        if chunks.len() > self.settings.max_segments {
            return Err(SubmitError::TooManySegments {
                count: chunks.len(),
                max: self.settings.max_segments,
            }
            .into());
        }

        let dict_versions = self.resolver.dict_versions();
        let voice_id = request
            .voice_id
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let effective_voice_id = self
            .pool
            .effective_voice(&model_id, voice_id.as_deref())
            .await?;

        let segments: Vec<Segment> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, text)| {
                let normalized = normalize_text(&text);
                let cache_key = fingerprint(
                    &normalized,
                    &model_id,
                    effective_voice_id.as_deref(),
                    &dict_versions,
                    &self.settings.compiler_version,
                );
                Segment::new(index, text, normalized, cache_key)
            })
            .collect();

        let job = Job::new(
            NewJob {
                normalized_text: normalize_text(&request.text),
                text: request.text,
                model_id,
                voice_id,
                effective_voice_id,
                reading_profile: request.reading_profile,
                prefer_phonemes: request.prefer_phonemes,
                dict_versions,
            },
            segments,
        );

        // 先落盘再占名额：对账看到的成员总能找到任务记录
        self.jobs.insert(&job).await?;

        let admitted = match self
            .coordination
            .counter_acquire(
                ACTIVE_JOBS_COUNTER,
                &job.job_id,
                self.settings.max_active_jobs,
                self.settings.jobs_ttl,
            )
            .await
        {
            Ok(admitted) => admitted,
            Err(e) => {
                self.discard_rejected(&job.job_id).await;
                return Err(e.into());
            }
        };
        if !admitted {
            self.discard_rejected(&job.job_id).await;
            return Err(SubmitError::TooManyActiveJobs.into());
        }

        if let Err(e) = self.coordination.enqueue(JOB_QUEUE, &job.job_id).await {
            self.release_admission(&job.job_id).await;
            self.discard_rejected(&job.job_id).await;
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job.job_id,
            model_id = %job.model_id,
            segments = job.segments.len(),
            chars = job.chars_total,
            "Job submitted"
        );
        Ok(job)
    }

    async fn discard_rejected(&self, job_id: &str) {
        if let Err(e) = self.coordination.delete(&JobStore::key(job_id)).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to drop rejected job record");
        }
    }

    // ========== 查询 / 取消 ==========

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>, ApplicationError> {
        Ok(self.jobs.get(job_id).await?)
    }

    /// 取消任务
    ///
    /// 终态任务原样返回；未释放的准入名额只释放一次
    pub async fn cancel_job(&self, job_id: &str) -> Result<Option<Job>, ApplicationError> {
        let updated = self
            .jobs
            .update(job_id, |job| {
                if !job.cancel() {
                    return false;
                }
                job.take_release()
            })
            .await?;

        let Some((job, release)) = updated else {
            return Ok(None);
        };
        if release {
            self.release_admission(job_id).await;
        }
        if job.is_canceled() {
            tracing::info!(job_id = %job_id, "Job canceled");
        }
        Ok(Some(job))
    }

    // ========== 准入 ==========

    /// 释放准入名额，失败只记录日志
    pub(super) async fn release_admission(&self, job_id: &str) {
        if let Err(e) = self
            .coordination
            .counter_release(ACTIVE_JOBS_COUNTER, job_id)
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to release admission slot");
        }
    }

    /// 未释放时抢占释放标记并释放名额
    pub(super) async fn release_if_needed(&self, job_id: &str) -> Result<(), ApplicationError> {
        let claimed = self.jobs.update(job_id, Job::take_release).await?;
        if let Some((_, true)) = claimed {
            self.release_admission(job_id).await;
        }
        Ok(())
    }

    /// 当前活跃任务数
    ///
    /// 对账：任务已消失或已终结的名额被逐个释放；排队过久且无人认领的任务被取消。
    /// 只释放具体成员，不覆盖计数，对账期间的并发准入不受影响
    pub async fn active_jobs(&self) -> Result<usize, ApplicationError> {
        let members = self.coordination.counter_members(ACTIVE_JOBS_COUNTER).await?;

        let workers_online = self.workers_online().await;
        let allow_stale_cleanup = !(self.settings.stale_queued_require_workers && workers_online == 0);

        let mut active = 0;
        for job_id in members {
            let job = match self.jobs.get(&job_id).await? {
                Some(job) => job,
                None => {
                    self.release_admission(&job_id).await;
                    continue;
                }
            };
            if job.is_terminal() {
                self.release_admission(&job_id).await;
                continue;
            }
            if job.status == JobStatus::Queued
                && self.is_stale_queued(&job, allow_stale_cleanup).await
            {
                self.cancel_stale_queued(&job_id).await?;
                continue;
            }
            active += 1;
        }

        Ok(active)
    }

    async fn is_stale_queued(&self, job: &Job, allow_stale_cleanup: bool) -> bool {
        let claimed = match self.coordination.exists(&claim_key(&job.job_id)).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "Claim check failed");
                true
            }
        };
        if claimed {
            return false;
        }

        let stale_for = (Utc::now() - job.updated_at).num_seconds().max(0) as u64;
        let abandoned = self.settings.stale_queued_abandoned_secs > 0
            && stale_for >= self.settings.stale_queued_abandoned_secs;
        let stale = allow_stale_cleanup
            && self.settings.stale_queued_secs > 0
            && stale_for >= self.settings.stale_queued_secs;
        stale || abandoned
    }

    async fn cancel_stale_queued(&self, job_id: &str) -> Result<(), ApplicationError> {
        let updated = self
            .jobs
            .update(job_id, |job| {
                if job.status != JobStatus::Queued {
                    return None;
                }
                job.cancel();
                job.error = Some("stale queued job".to_string());
                job.error_code = Some(JobErrorCode::StaleQueued);
                Some(job.take_release())
            })
            .await?;

        if let Some((_, Some(release))) = updated {
            self.metrics.record_stale_queued_cancel();
            if release {
                self.release_admission(job_id).await;
            }
            tracing::warn!(job_id = %job_id, "Stale queued job canceled");
        }
        Ok(())
    }

    // ========== 孤儿回收 ==========

    /// 处理中但无人认领的任务重新入队
    ///
    /// 每个任务在 requeue 标记有效期内最多入队一次，返回本次入队数量
    pub async fn requeue_orphans(&self) -> Result<usize, ApplicationError> {
        let mut requeued = 0;
        for job_id in self.jobs.job_ids().await? {
            let Some(job) = self.jobs.get(&job_id).await? else {
                continue;
            };
            if job.status != JobStatus::InProgress {
                continue;
            }
            if self.coordination.exists(&claim_key(&job_id)).await? {
                continue;
            }
            let marked = self
                .coordination
                .set_nx(&requeue_key(&job_id), "1", REQUEUE_MARK_TTL)
                .await?;
            if !marked {
                continue;
            }
            self.coordination.enqueue(JOB_QUEUE, &job_id).await?;
            tracing::warn!(job_id = %job_id, "Orphaned job requeued");
            requeued += 1;
        }
        Ok(requeued)
    }

    // ========== 运行状态 ==========

    pub async fn workers_online(&self) -> usize {
        match self.coordination.live_workers().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to count live workers");
                0
            }
        }
    }

    pub async fn queue_length(&self) -> usize {
        match self.coordination.queue_len(JOB_QUEUE).await {
            Ok(len) => len,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read queue length");
                0
            }
        }
    }

    pub async fn status_snapshot(&self) -> StatusSnapshot {
        let active_jobs = match self.active_jobs().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "Active job reconciliation failed");
                0
            }
        };
        let metrics = self.metrics.snapshot();
        StatusSnapshot {
            workers_online: self.workers_online().await,
            queue_len: self.queue_length().await,
            active_jobs,
            retry_counts: RetryCounts {
                segment_retries: metrics.segment_retries,
                retry_caps: metrics.segment_retry_caps,
            },
            fallback_model_usage: metrics.fallback_segments,
            merge_lock_contention: MergeLockContention {
                wait_count: metrics.merge_lock_waits,
                wait_total_ms: metrics.merge_lock_wait_ms,
                wait_max_ms: metrics.merge_lock_wait_max_ms,
            },
            stale_queued_cancels: metrics.stale_queued_cancels,
        }
    }
}
