//! 整段音频合并
//!
//! 已完成任务的就绪片段按顺序拼接为一个文件；
//! merged_meta.json 记录合并指纹，指纹不变时直接复用已有文件

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::manager::JobManager;
use crate::application::error::ApplicationError;
use crate::application::ports::AudioFormat;
use crate::domain::job::{Job, JobProgress, JobStatus, Segment};

const MERGED_META_FILE: &str = "merged_meta.json";

/// 合并产物
#[derive(Debug, Clone)]
pub struct MergedAudio {
    pub path: PathBuf,
    pub format: AudioFormat,
    pub fingerprint: String,
    /// 复用了已有的合并文件
    pub reused: bool,
}

/// 合并结果
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// 任务未完成或合并锁被占用，稍后重试
    NotReady {
        status: JobStatus,
        progress: JobProgress,
    },
    Ready(MergedAudio),
}

#[derive(Debug, Serialize, Deserialize)]
struct MergedMeta {
    fingerprint: String,
    #[serde(default)]
    segment_cache_keys: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// 合并指纹
///
/// md5(按 key 排序的 JSON)：任务、词典版本、模型、音色、参与合并的片段缓存 key
pub fn merge_fingerprint(job: &Job, segments: &[&Segment]) -> String {
    let keys: Vec<&str> = segments.iter().map(|s| s.cache_key.as_str()).collect();
    let payload = serde_json::json!({
        "job_id": job.job_id,
        "dict_versions": job.dict_versions,
        "model_id": job.model_id,
        "voice_id": job.voice_id,
        "segment_cache_keys": keys,
    });
    format!("{:x}", md5::compute(payload.to_string().as_bytes()))
}

fn read_meta(path: &Path) -> Option<MergedMeta> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

impl JobManager {
    /// 获取任务的合并音频
    pub async fn merged_audio(&self, job_id: &str) -> Result<MergeOutcome, ApplicationError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Job", job_id))?;

        if !matches!(
            job.status,
            JobStatus::Complete | JobStatus::CompleteWithErrors
        ) {
            return Ok(MergeOutcome::NotReady {
                status: job.status,
                progress: job.progress(),
            });
        }

        let ready = job.ready_segments();
        if ready.is_empty() {
            return Err(ApplicationError::invalid_state("no ready segments to merge"));
        }

        let format = self.encoder.format();
        let job_dir = self.settings.segments_dir.join(job_id);
        tokio::fs::create_dir_all(&job_dir)
            .await
            .map_err(|e| ApplicationError::internal(e.to_string()))?;

        let wait_start = Instant::now();
        let token = self
            .merge_lock
            .acquire(job_id, self.settings.merge_lock_wait)
            .await?;
        self.metrics
            .record_merge_lock_wait(wait_start.elapsed().as_secs_f64() * 1000.0);

        let Some(token) = token else {
            tracing::debug!(job_id = %job_id, "Merge lock busy");
            return Ok(MergeOutcome::NotReady {
                status: job.status,
                progress: job.progress(),
            });
        };

        let result = self.merge_locked(&job, &ready, &job_dir, format).await;

        if let Err(e) = self.merge_lock.release(job_id, &token).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to release merge lock");
        }
        result.map(MergeOutcome::Ready)
    }

    async fn merge_locked(
        &self,
        job: &Job,
        ready: &[&Segment],
        job_dir: &Path,
        format: AudioFormat,
    ) -> Result<MergedAudio, ApplicationError> {
        let fingerprint = merge_fingerprint(job, ready);
        let merged_path = job_dir.join(format!("merged.{}", format.extension()));
        let meta_path = job_dir.join(MERGED_META_FILE);

        if merged_path.exists() {
            if let Some(meta) = read_meta(&meta_path) {
                if meta.fingerprint == fingerprint {
                    tracing::debug!(job_id = %job.job_id, "Reusing merged audio");
                    return Ok(MergedAudio {
                        path: merged_path,
                        format,
                        fingerprint,
                        reused: true,
                    });
                }
            }
        }

        let sources: Vec<PathBuf> = ready
            .iter()
            .filter_map(|s| s.path.as_ref().map(PathBuf::from))
            .collect();
        let tmp_path = job_dir.join(format!("merged.tmp.{}", format.extension()));
        let encoder = self.encoder.clone();
        let target = tmp_path.clone();
        let start = Instant::now();
        tokio::task::spawn_blocking(move || encoder.concat(&sources, &target)).await??;
        tokio::fs::rename(&tmp_path, &merged_path)
            .await
            .map_err(|e| ApplicationError::internal(e.to_string()))?;

        let meta = MergedMeta {
            fingerprint: fingerprint.clone(),
            segment_cache_keys: ready.iter().map(|s| s.cache_key.clone()).collect(),
            created_at: Some(Utc::now()),
        };
        tokio::fs::write(&meta_path, serde_json::to_vec(&meta)?)
            .await
            .map_err(|e| ApplicationError::internal(e.to_string()))?;

        tracing::info!(
            job_id = %job.job_id,
            segments = ready.len(),
            merge_ms = start.elapsed().as_millis() as u64,
            "Merged audio written"
        );
        Ok(MergedAudio {
            path: merged_path,
            format,
            fingerprint,
            reused: false,
        })
    }
}
