//! Job Query Handlers

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::queries::{
    GetJob, GetMergedAudio, GetMetrics, GetPlaylist, GetSegmentAudio, GetStatus, JobView,
    ListModels, MetricsReport, ModelView, Playlist, PlaylistEntry, SegmentAudio, SegmentUrls,
};
use crate::application::scheduler::{JobManager, MergeOutcome, StatusSnapshot};
use crate::domain::job::{round3, Job, SegmentStatus};

/// 未就绪片段的建议重试间隔
const PLAYLIST_RETRY_AFTER_MS: u64 = 500;

const MODEL_LANGUAGE: &str = "en";
const MODEL_ENGINE: &str = "coqui-tts";

async fn load_job(manager: &JobManager, job_id: &str) -> Result<Job, ApplicationError> {
    manager
        .get_job(job_id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("Job", job_id))
}

// ============================================================================
// GetJob
// ============================================================================

/// GetJob Handler
pub struct GetJobHandler {
    manager: Arc<JobManager>,
}

impl GetJobHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, query: GetJob) -> Result<JobView, ApplicationError> {
        let job = load_job(&self.manager, &query.job_id).await?;
        let progress = job.progress();
        Ok(JobView { job, progress })
    }
}

// ============================================================================
// GetSegmentAudio
// ============================================================================

/// GetSegmentAudio Handler
pub struct GetSegmentAudioHandler {
    manager: Arc<JobManager>,
}

impl GetSegmentAudioHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, query: GetSegmentAudio) -> Result<SegmentAudio, ApplicationError> {
        let job = load_job(&self.manager, &query.job_id).await?;
        let segment = job
            .segment(&query.segment_id)
            .ok_or_else(|| ApplicationError::not_found("Segment", query.segment_id.clone()))?;

        let Some(path) = segment.path.as_ref().map(PathBuf::from) else {
            return Ok(SegmentAudio::Pending {
                status: segment.status,
            });
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::warn!(
                job_id = %query.job_id,
                segment_id = %query.segment_id,
                path = %path.display(),
                "Segment artifact missing"
            );
            return Err(ApplicationError::not_found("Segment audio", query.segment_id));
        }

        Ok(SegmentAudio::Ready {
            path,
            cache_key: segment.cache_key.clone(),
            content_type: self.manager.encoder().format().mime_type(),
        })
    }
}

// ============================================================================
// GetPlaylist
// ============================================================================

/// GetPlaylist Handler
pub struct GetPlaylistHandler {
    manager: Arc<JobManager>,
}

impl GetPlaylistHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, query: GetPlaylist) -> Result<Playlist, ApplicationError> {
        let job = load_job(&self.manager, &query.job_id).await?;
        let proxy_base = &self.manager.settings().public_segment_base_url;

        let mut segments: Vec<_> = job.segments.iter().collect();
        segments.sort_by_key(|s| s.index);

        let playlist = segments
            .into_iter()
            .map(|seg| {
                let urls = SegmentUrls::new(proxy_base, &job.job_id, &seg.segment_id);
                let url_best = urls.best(query.prefer_proxy).to_string();
                let ready = seg.is_ready();
                let retry_after_ms = (!ready && seg.status != SegmentStatus::Error)
                    .then_some(PLAYLIST_RETRY_AFTER_MS);
                PlaylistEntry {
                    index: seg.index,
                    segment_id: seg.segment_id.clone(),
                    status: seg.status,
                    url_proxy: urls.proxy,
                    url_backend: urls.backend,
                    url_best,
                    ready,
                    retry_after_ms,
                }
            })
            .collect();

        Ok(Playlist {
            job_id: job.job_id,
            playlist,
        })
    }
}

// ============================================================================
// GetMergedAudio
// ============================================================================

/// GetMergedAudio Handler
pub struct GetMergedAudioHandler {
    manager: Arc<JobManager>,
}

impl GetMergedAudioHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, query: GetMergedAudio) -> Result<MergeOutcome, ApplicationError> {
        self.manager.merged_audio(&query.job_id).await
    }
}

// ============================================================================
// GetStatus / GetMetrics
// ============================================================================

/// GetStatus Handler
pub struct GetStatusHandler {
    manager: Arc<JobManager>,
}

impl GetStatusHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, _query: GetStatus) -> Result<StatusSnapshot, ApplicationError> {
        Ok(self.manager.status_snapshot().await)
    }
}

/// GetMetrics Handler
pub struct GetMetricsHandler {
    manager: Arc<JobManager>,
}

impl GetMetricsHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, _query: GetMetrics) -> Result<MetricsReport, ApplicationError> {
        let metrics = self.manager.metrics().snapshot();
        Ok(MetricsReport {
            total_jobs: metrics.total_jobs,
            total_segments: metrics.total_segments,
            avg_chars_per_sec: round3(metrics.avg_chars_per_sec()),
            cache_hit_rate: round3(metrics.cache_hit_rate()),
            error_rate: round3(metrics.error_rate()),
            queue_len: self.manager.queue_length().await,
            workers_online: self.manager.workers_online().await,
            active_jobs: self.manager.active_jobs().await?,
            segment_retries: metrics.segment_retries,
            segment_retry_caps: metrics.segment_retry_caps,
            fallback_model_usage: metrics.fallback_segments,
            merge_lock_waits: metrics.merge_lock_waits,
            merge_lock_wait_ms: round3(metrics.merge_lock_wait_ms),
            merge_lock_wait_max_ms: round3(metrics.merge_lock_wait_max_ms),
            stale_queued_cancels: metrics.stale_queued_cancels,
        })
    }
}

/// ListModels Handler
///
/// 按白名单顺序列出模型，并标注默认模型与高质量模型
pub struct ListModelsHandler {
    manager: Arc<JobManager>,
}

impl ListModelsHandler {
    pub fn new(manager: Arc<JobManager>) -> Self {
        Self { manager }
    }

    pub async fn handle(&self, _query: ListModels) -> Result<Vec<ModelView>, ApplicationError> {
        let settings = self.manager.settings();
        Ok(settings
            .model_allowlist
            .iter()
            .map(|model_id| ModelView {
                model_id: model_id.clone(),
                language: MODEL_LANGUAGE.to_string(),
                engine: MODEL_ENGINE.to_string(),
                is_default: *model_id == settings.default_model,
                is_quality: *model_id == settings.quality_model,
            })
            .collect())
    }
}
