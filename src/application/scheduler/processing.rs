//! 任务与片段处理
//!
//! 片段状态机: queued → synthesizing → {ready, error}；
//! 容量类合成错误回退到高容量模型一次，其余错误直接失败

use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};

use super::manager::JobManager;
use crate::application::error::ApplicationError;
use crate::application::metrics::JobRecord;
use crate::application::ports::{SynthesisError, SynthesisOutput};
use crate::domain::job::{short_error, Job, SegmentErrorCode, SegmentStatus, SegmentTimings};

#[inline]
fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// 一次成功的合成（编码可能失败）
struct Rendered {
    output_path: PathBuf,
    used_phonemes: bool,
    synth_ms: f64,
    encode_ms: f64,
    encoded: Result<(), String>,
}

/// 单次合成尝试的分类结果
enum Attempt {
    Success(Rendered),
    /// 容量耗尽，可回退到高容量模型
    Recoverable(SynthesisError),
    Fatal(SynthesisError),
}

/// 片段最终结果
enum SegmentOutcome {
    Rendered {
        rendered: Rendered,
        fallback_model: Option<String>,
    },
    Failed {
        code: SegmentErrorCode,
        message: String,
        attempted_models: Vec<String>,
    },
}

/// 开始合成前的检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptGate {
    Proceed { retry: bool },
    CapExceeded,
    Skip,
}

/// 片段合成所需输入
struct SegmentInput<'a> {
    job_id: &'a str,
    segment_id: &'a str,
    model_id: &'a str,
    voice_id: Option<&'a str>,
    text: &'a str,
    phonemes: Option<&'a str>,
    cache_key: &'a str,
}

impl JobManager {
    /// 处理一个任务
    ///
    /// 可重复调用：已终结的片段会被跳过
    pub async fn process_job(&self, job_id: &str) -> Result<(), ApplicationError> {
        let Some(job) = self.jobs.get(job_id).await? else {
            tracing::warn!(job_id = %job_id, "Job not found, skipping");
            return Ok(());
        };
        if job.is_canceled() {
            return self.release_if_needed(job_id).await;
        }

        let job_start = Instant::now();
        let Some((job, started)) = self.jobs.update(job_id, Job::mark_in_progress).await? else {
            return Ok(());
        };
        if !started {
            if job.is_canceled() {
                self.release_if_needed(job_id).await?;
            }
            return Ok(());
        }

        let now = Utc::now();
        let stale_secs = self.settings.segment_stale_secs;
        if let Some((_, reset)) = self
            .jobs
            .update(job_id, move |job| job.reset_stale_segments(now, stale_secs))
            .await?
        {
            if reset > 0 {
                tracing::info!(job_id = %job_id, reset = reset, "Stale segments requeued");
            }
        }

        let Some(job) = self.jobs.get(job_id).await? else {
            return Ok(());
        };
        if job.is_canceled() {
            return self.release_if_needed(job_id).await;
        }

        let pending = job.pending_segment_ids();
        let width = self.settings.per_job_width();
        tracing::info!(
            job_id = %job_id,
            pending = pending.len(),
            width = width,
            "Processing job"
        );

        let mut any_errors = false;
        if width <= 1 {
            for segment_id in pending.iter() {
                if self.is_canceled(job_id).await? {
                    return self.release_if_needed(job_id).await;
                }
                any_errors |= self.run_segment(job_id, segment_id).await;
            }
        } else {
            let segment_futures: Vec<_> = pending
                .iter()
                .map(|segment_id| self.run_segment(job_id, segment_id))
                .collect();
            let results: Vec<bool> = stream::iter(segment_futures)
                .buffer_unordered(width)
                .collect()
                .await;
            any_errors = results.into_iter().any(|failed| failed);
        }

        let duration_secs = job_start.elapsed().as_secs_f64();

        let Some(latest) = self.jobs.get(job_id).await? else {
            return Ok(());
        };
        if latest.is_canceled() {
            return self.release_if_needed(job_id).await;
        }
        let any_errors = any_errors
            || latest
                .segments
                .iter()
                .any(|s| s.status == SegmentStatus::Error);

        let finalized = self
            .jobs
            .update(job_id, move |job| {
                let done = job.finalize(any_errors, duration_secs);
                (done, job.take_release())
            })
            .await?;

        let Some((job, (done, release))) = finalized else {
            return Ok(());
        };
        if release {
            self.release_admission(job_id).await;
        }
        if done {
            self.metrics.record_job(JobRecord {
                total_segments: job.segments.len() as u64,
                total_chars: job.chars_total as u64,
                duration_sec: duration_secs,
                cache_hits: job.cache_hit_count,
                cache_misses: job.cache_miss_count,
                error_segments: job.error_segment_count,
            });
            tracing::info!(
                job_id = %job_id,
                status = %job.status,
                segments = job.segments.len(),
                cache_hits = job.cache_hit_count,
                errors = job.error_segment_count,
                total_ms = job.timing_total_ms.unwrap_or_default(),
                chars_per_sec = job.chars_per_sec.unwrap_or_default(),
                "Job finished"
            );
        }
        Ok(())
    }

    async fn is_canceled(&self, job_id: &str) -> Result<bool, ApplicationError> {
        Ok(self
            .jobs
            .get(job_id)
            .await?
            .map_or(true, |job| job.is_canceled()))
    }

    /// 处理片段，基础设施错误按片段失败计
    async fn run_segment(&self, job_id: &str, segment_id: &str) -> bool {
        match self.process_segment(job_id, segment_id).await {
            Ok(failed) => failed,
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    segment_id = %segment_id,
                    error = %e,
                    "Segment processing aborted"
                );
                true
            }
        }
    }

    /// 处理单个片段，返回是否以错误结束
    ///
    /// 任务不存在、已取消、片段不存在或已终结时不做任何事，均不算片段失败
    pub async fn process_segment(
        &self,
        job_id: &str,
        segment_id: &str,
    ) -> Result<bool, ApplicationError> {
        let Some(job) = self.jobs.get(job_id).await? else {
            tracing::debug!(job_id = %job_id, segment_id = %segment_id, "Job gone, segment skipped");
            return Ok(false);
        };
        if job.is_canceled() {
            return Ok(false);
        }
        let Some(segment) = job.segment(segment_id) else {
            return Ok(false);
        };
        if segment.is_terminal() {
            return Ok(false);
        }

        let cache_key = segment.cache_key.clone();
        let text = segment.text.clone();
        let segment_start = Instant::now();

        let cached = match self.cache.get(&cache_key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(cache_key = %cache_key, error = %e, "Cache lookup failed");
                None
            }
        };
        if let Some(path) = cached {
            let path = path.to_string_lossy().into_owned();
            self.jobs
                .update(job_id, |job| {
                    if job.is_canceled() {
                        return;
                    }
                    let hit = match job.segment_mut(segment_id) {
                        Some(seg) if !seg.is_terminal() => {
                            seg.mark_cached(path.clone());
                            true
                        }
                        _ => false,
                    };
                    if hit {
                        job.cache_hit_count += 1;
                    }
                })
                .await?;
            tracing::debug!(job_id = %job_id, segment_id = %segment_id, "Segment cache hit");
            return Ok(false);
        }

        let max_attempts = self.settings.segment_max_retries + 1;
        let gate = self
            .jobs
            .update(job_id, |job| {
                if job.is_canceled() {
                    return AttemptGate::Skip;
                }
                let gate = match job.segment_mut(segment_id) {
                    Some(seg) if !seg.is_terminal() => {
                        seg.attempts += 1;
                        if seg.attempts > max_attempts {
                            seg.mark_error(SegmentErrorCode::RetryCapExceeded, "retry cap exceeded");
                            AttemptGate::CapExceeded
                        } else {
                            seg.status = SegmentStatus::Synthesizing;
                            seg.started_at = Some(Utc::now());
                            AttemptGate::Proceed {
                                retry: seg.attempts > 1,
                            }
                        }
                    }
                    _ => AttemptGate::Skip,
                };
                match gate {
                    AttemptGate::CapExceeded => job.error_segment_count += 1,
                    AttemptGate::Proceed { .. } => job.cache_miss_count += 1,
                    AttemptGate::Skip => {}
                }
                gate
            })
            .await?;

        match gate.map(|(_, gate)| gate) {
            None => return Ok(true),
            Some(AttemptGate::Skip) => return Ok(false),
            Some(AttemptGate::CapExceeded) => {
                self.metrics.record_retry_cap();
                tracing::warn!(job_id = %job_id, segment_id = %segment_id, "Segment retry cap exceeded");
                return Ok(true);
            }
            Some(AttemptGate::Proceed { retry }) => {
                if retry {
                    self.metrics.record_segment_retry();
                }
            }
        }

        // 音素化可能调用外部进程
        let resolver = self.resolver.clone();
        let resolve_text = text.clone();
        let resolve_start = Instant::now();
        let resolved =
            tokio::task::spawn_blocking(move || resolver.resolve_text(&resolve_text)).await?;
        let resolve_ms = elapsed_ms(resolve_start);

        let phoneme_text = if job.prefer_phonemes {
            resolved.phoneme_text.clone()
        } else {
            None
        };
        let source_counts = resolved.source_counts;

        let outcome = self
            .render_with_fallback(SegmentInput {
                job_id,
                segment_id,
                model_id: &job.model_id,
                voice_id: job.effective_voice_id.as_deref(),
                text: &text,
                phonemes: phoneme_text.as_deref(),
                cache_key: &cache_key,
            })
            .await;

        match outcome {
            SegmentOutcome::Rendered {
                rendered,
                fallback_model,
            } => {
                let total_ms = elapsed_ms(segment_start);
                if rendered.encoded.is_ok() && fallback_model.is_none() {
                    if let Err(e) = self.cache.set(&cache_key, &rendered.output_path).await {
                        tracing::warn!(cache_key = %cache_key, error = %e, "Cache write failed");
                    }
                }

                let attempted_models = match &fallback_model {
                    Some(fallback) => vec![job.model_id.clone(), fallback.clone()],
                    None => Vec::new(),
                };
                let path = rendered.output_path.to_string_lossy().into_owned();
                let timings =
                    SegmentTimings::new(resolve_ms, rendered.synth_ms, rendered.encode_ms, total_ms);

                let applied = self
                    .jobs
                    .update(job_id, |job| {
                        if job.is_canceled() {
                            return false;
                        }
                        let Some(seg) = job.segment_mut(segment_id) else {
                            return false;
                        };
                        if seg.is_terminal() {
                            return false;
                        }
                        seg.timings = Some(timings);
                        seg.resolved_phonemes = phoneme_text.clone();
                        seg.resolve_source_counts = source_counts.clone();
                        seg.used_phonemes = rendered.used_phonemes;
                        if !attempted_models.is_empty() {
                            seg.attempted_models = attempted_models.clone();
                            seg.fallback_used = true;
                        }
                        match &rendered.encoded {
                            Ok(()) => seg.mark_ready(path.clone()),
                            Err(message) => {
                                seg.mark_error(SegmentErrorCode::EncodeFailed, message.clone())
                            }
                        }
                        if rendered.encoded.is_err() {
                            job.error_segment_count += 1;
                        }
                        if phoneme_text.is_some() {
                            job.phoneme_segment_count += 1;
                        }
                        if rendered.used_phonemes {
                            job.used_phoneme_segment_count += 1;
                        }
                        true
                    })
                    .await?
                    .map_or(false, |(_, applied)| applied);

                if !applied {
                    tracing::debug!(
                        job_id = %job_id,
                        segment_id = %segment_id,
                        "Segment result discarded"
                    );
                    return Ok(false);
                }
                if fallback_model.is_some() {
                    self.metrics.record_fallback_usage();
                }

                tracing::info!(
                    job_id = %job_id,
                    segment_id = %segment_id,
                    resolve_ms = timings.resolve_ms,
                    synth_ms = timings.synth_ms,
                    encode_ms = timings.encode_ms,
                    total_ms = timings.total_ms,
                    "Segment timing"
                );
                if let Err(message) = &rendered.encoded {
                    tracing::warn!(
                        job_id = %job_id,
                        segment_id = %segment_id,
                        error = %message,
                        "Segment encode failed"
                    );
                }
                Ok(rendered.encoded.is_err())
            }
            SegmentOutcome::Failed {
                code,
                message,
                attempted_models,
            } => {
                let timings = SegmentTimings::new(resolve_ms, 0.0, 0.0, elapsed_ms(segment_start));
                let applied = self
                    .jobs
                    .update(job_id, |job| {
                        if job.is_canceled() {
                            return false;
                        }
                        let Some(seg) = job.segment_mut(segment_id) else {
                            return false;
                        };
                        if seg.is_terminal() {
                            return false;
                        }
                        seg.mark_error(code, message.clone());
                        if !attempted_models.is_empty() {
                            seg.attempted_models = attempted_models.clone();
                        }
                        seg.timings = Some(timings);
                        seg.resolved_phonemes = phoneme_text.clone();
                        seg.resolve_source_counts = source_counts.clone();
                        job.error_segment_count += 1;
                        true
                    })
                    .await?
                    .map_or(false, |(_, applied)| applied);

                tracing::warn!(
                    job_id = %job_id,
                    segment_id = %segment_id,
                    code = code.as_str(),
                    error = %message,
                    "Segment failed"
                );
                Ok(applied)
            }
        }
    }

    /// 合成并在容量错误时回退一次
    async fn render_with_fallback(&self, input: SegmentInput<'_>) -> SegmentOutcome {
        let primary_path = self.cache.segment_path(input.cache_key);
        let first = self.render(&input, input.model_id, primary_path).await;

        let error = match self.classify(input.model_id, first) {
            Attempt::Success(rendered) => {
                return SegmentOutcome::Rendered {
                    rendered,
                    fallback_model: None,
                }
            }
            Attempt::Fatal(e) => {
                return SegmentOutcome::Failed {
                    code: SegmentErrorCode::SynthesisFailed,
                    message: short_error(&e.to_string()),
                    attempted_models: Vec::new(),
                }
            }
            Attempt::Recoverable(e) => e,
        };

        let quality = self.settings.quality_model.as_str();
        let original = short_error(&error.to_string());
        tracing::info!(
            model_id = %input.model_id,
            job_id = %input.job_id,
            segment_id = %input.segment_id,
            error = %original,
            "SEGMENT_FAIL"
        );
        tracing::info!(
            model_id = %quality,
            job_id = %input.job_id,
            segment_id = %input.segment_id,
            "SEGMENT_RETRY"
        );

        // 回退产物不写入原模型的缓存路径
        let fallback_path = self
            .cache
            .segment_path(&format!("{}.fallback", input.cache_key));
        match self.render(&input, quality, fallback_path).await {
            Ok(rendered) => {
                tracing::info!(
                    model_id = %quality,
                    job_id = %input.job_id,
                    segment_id = %input.segment_id,
                    "SEGMENT_OK_FALLBACK"
                );
                SegmentOutcome::Rendered {
                    rendered,
                    fallback_model: Some(quality.to_string()),
                }
            }
            Err(fallback_error) => SegmentOutcome::Failed {
                code: SegmentErrorCode::FallbackFailed,
                message: format!(
                    "orig={}; fallback={}",
                    original,
                    short_error(&fallback_error.to_string())
                ),
                attempted_models: vec![input.model_id.to_string(), quality.to_string()],
            },
        }
    }

    fn classify(&self, model_id: &str, result: Result<Rendered, SynthesisError>) -> Attempt {
        match result {
            Ok(rendered) => Attempt::Success(rendered),
            Err(e) if e.is_capacity_exhausted() && model_id != self.settings.quality_model => {
                Attempt::Recoverable(e)
            }
            Err(e) => Attempt::Fatal(e),
        }
    }

    /// 借出引擎合成，然后在 blocking 线程中编码
    async fn render(
        &self,
        input: &SegmentInput<'_>,
        model_id: &str,
        dest: PathBuf,
    ) -> Result<Rendered, SynthesisError> {
        let (output, synth_ms) = {
            let synth = self.pool.acquire(model_id, input.voice_id).await?;
            let _serial = self.synth_lock.lock().await;
            let start = Instant::now();
            let output = synth.synthesize(input.text, input.phonemes).await?;
            (output, elapsed_ms(start))
        };

        let SynthesisOutput {
            samples,
            sample_rate,
            used_phonemes,
        } = output;
        let encoder = self.encoder.clone();
        let target = dest.clone();
        let encode_start = Instant::now();
        let encoded =
            match tokio::task::spawn_blocking(move || encoder.encode(&samples, sample_rate, &target))
                .await
            {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(e.to_string()),
            };

        Ok(Rendered {
            output_path: dest,
            used_phonemes,
            synth_ms,
            encode_ms: elapsed_ms(encode_start),
            encoded,
        })
    }
}
