//! Job Scheduler - 任务/片段调度核心
//!
//! - 准入控制（有界计数器）
//! - 片段状态机：缓存、重试上限、容量回退、过期回收
//! - 合成实例池与进程内合成串行化
//! - 合并与合并锁
//!
//! 单进程与多进程部署共用同一套逻辑，区别只在协调后端

mod job_store;
mod manager;
mod merge;
mod processing;
mod settings;
mod synth_pool;

#[cfg(test)]
pub(crate) mod test_support;

pub use job_store::{JobStore, JOB_KEY_PREFIX};
pub use manager::{
    claim_key, requeue_key, JobManager, JobRequest, MergeLockContention, RetryCounts,
    SchedulerDeps, StatusSnapshot, ACTIVE_JOBS_COUNTER, JOB_QUEUE,
};
pub use merge::{merge_fingerprint, MergeOutcome, MergedAudio};
pub use settings::{SchedulerSettings, DEFAULT_MODEL_ALIAS, QUALITY_MODEL_ALIAS};
pub use synth_pool::{PooledSynthesizer, SynthesizerPool};

#[cfg(test)]
mod tests {
    use super::test_support::{harness, harness_on, AdmitDuringSnapshot, Behavior};
    use super::*;
    use crate::application::error::{ApplicationError, SubmitError};
    use crate::domain::job::{JobErrorCode, JobStatus, SegmentErrorCode, SegmentStatus};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    // 每句都长于目标块的一半，分块后恰好三段
    const THREE_SENTENCES: &str = "The first sentence is quite a bit longer now. \
        The second sentence is also long enough here. \
        A third sentence follows to finish the text.";

    async fn active_counter(manager: &JobManager) -> usize {
        manager
            .coordination()
            .counter_get(ACTIVE_JOBS_COUNTER)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_process_completes() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.segments.len(), 3);
        assert_eq!(h.manager.queue_length().await, 1);
        assert_eq!(active_counter(&h.manager).await, 1);

        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        assert!(done.segments.iter().all(|s| s.status == SegmentStatus::Ready));
        assert_eq!(done.cache_miss_count, 3);
        assert!(done.active_job_released);
        assert!(done.timing_total_ms.is_some());
        assert_eq!(active_counter(&h.manager).await, 0);
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 3);

        let metrics = h.manager.metrics().snapshot();
        assert_eq!(metrics.total_jobs, 1);
        assert_eq!(metrics.total_segments, 3);
    }

    #[tokio::test]
    async fn test_admission_cap_and_release() {
        let h = harness(|settings, _| settings.max_active_jobs = 1);

        let first = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        let err = h
            .manager
            .submit(JobRequest::new("Another request."))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Submit(SubmitError::TooManyActiveJobs)
        ));

        h.manager.process_job(&first.job_id).await.unwrap();
        assert!(h.manager.submit(JobRequest::new("Another request.")).await.is_ok());
    }

    #[tokio::test]
    async fn test_submit_rejections_leave_no_trace() {
        let h = harness(|settings, _| {
            settings.max_text_chars = 100;
            settings.max_segments = 2;
        });

        let mut request = JobRequest::new("Hello.");
        request.model_id = Some("other".to_string());
        assert!(matches!(
            h.manager.submit(request).await.unwrap_err(),
            ApplicationError::Submit(SubmitError::ModelNotAllowed { .. })
        ));

        assert!(matches!(
            h.manager.submit(JobRequest::new("x".repeat(101))).await.unwrap_err(),
            ApplicationError::Submit(SubmitError::TextTooLong { len: 101, max: 100 })
        ));

        assert!(matches!(
            h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap_err(),
            ApplicationError::Submit(SubmitError::TooManySegments { count: 3, max: 2 })
        ));

        assert!(matches!(
            h.manager.submit(JobRequest::new("   \n  ")).await.unwrap_err(),
            ApplicationError::Submit(SubmitError::EmptyText)
        ));

        assert_eq!(active_counter(&h.manager).await, 0);
        assert_eq!(h.manager.queue_length().await, 0);
    }

    #[tokio::test]
    async fn test_model_aliases_resolve() {
        let h = harness(|_, _| {});
        let mut request = JobRequest::new("Hello there.");
        request.model_id = Some(QUALITY_MODEL_ALIAS.to_string());
        let job = h.manager.submit(request).await.unwrap();
        assert_eq!(job.model_id, "quality");

        let mut request = JobRequest::new("Hello there.");
        request.model_id = Some(DEFAULT_MODEL_ALIAS.to_string());
        assert_eq!(h.manager.submit(request).await.unwrap().model_id, "fast");
    }

    #[tokio::test]
    async fn test_second_job_hits_cache() {
        let h = harness(|_, _| {});
        let first = h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap();
        h.manager.process_job(&first.job_id).await.unwrap();
        let calls = h.synth_calls.load(Ordering::SeqCst);

        let second = h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap();
        h.manager.process_job(&second.job_id).await.unwrap();

        let done = h.manager.get_job(&second.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        assert_eq!(done.cache_hit_count, 3);
        assert_eq!(done.cache_miss_count, 0);
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), calls);
        for (a, b) in first.segments.iter().zip(done.segments.iter()) {
            assert_eq!(a.cache_key, b.cache_key);
            assert_eq!(b.timings.unwrap().total_ms, 0.0);
        }
    }

    #[tokio::test]
    async fn test_capacity_error_falls_back_once() {
        let h = harness(|_, factory| {
            factory.behaviors.insert("fast".to_string(), Behavior::Capacity);
        });
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        let seg = &done.segments[0];
        assert_eq!(seg.status, SegmentStatus::Ready);
        assert!(seg.fallback_used);
        assert_eq!(seg.attempted_models, vec!["fast".to_string(), "quality".to_string()]);
        assert!(seg.path.as_deref().unwrap().contains(".fallback"));
        assert_eq!(h.manager.metrics().snapshot().fallback_segments, 1);

        // 回退产物不入缓存
        let again = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager.process_job(&again.job_id).await.unwrap();
        let again = h.manager.get_job(&again.job_id).await.unwrap().unwrap();
        assert_eq!(again.cache_hit_count, 0);
    }

    #[tokio::test]
    async fn test_fallback_failure_reports_both_errors() {
        let h = harness(|_, factory| {
            factory.behaviors.insert("fast".to_string(), Behavior::Capacity);
            factory.behaviors.insert("quality".to_string(), Behavior::Fail);
        });
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::CompleteWithErrors);
        let seg = &done.segments[0];
        assert_eq!(seg.error_code, Some(SegmentErrorCode::FallbackFailed));
        let message = seg.error.as_deref().unwrap();
        assert!(message.starts_with("orig="));
        assert!(message.contains("; fallback="));
        assert_eq!(seg.attempted_models.len(), 2);
        assert_eq!(done.error_segment_count, 1);
        assert_eq!(active_counter(&h.manager).await, 0);
    }

    #[tokio::test]
    async fn test_other_errors_do_not_fall_back() {
        let h = harness(|_, factory| {
            factory.behaviors.insert("fast".to_string(), Behavior::Fail);
        });
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        let seg = &done.segments[0];
        assert_eq!(seg.error_code, Some(SegmentErrorCode::SynthesisFailed));
        assert!(seg.attempted_models.is_empty());
        assert!(!seg.fallback_used);
        assert_eq!(h.created.load(Ordering::SeqCst), 1);
        assert_eq!(h.manager.metrics().snapshot().fallback_segments, 0);
    }

    #[tokio::test]
    async fn test_quality_model_capacity_error_is_final() {
        let h = harness(|_, factory| {
            factory.behaviors.insert("quality".to_string(), Behavior::Capacity);
        });
        let mut request = JobRequest::new("Hello there world.");
        request.model_id = Some("quality".to_string());
        let job = h.manager.submit(request).await.unwrap();
        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(
            done.segments[0].error_code,
            Some(SegmentErrorCode::SynthesisFailed)
        );
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fingerprint_ignores_profile_and_unsupported_voice() {
        let h = harness(|_, factory| {
            factory.voice_models.insert("quality".to_string());
        });

        let plain = h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();

        let mut profiled = JobRequest::new("Hello there.");
        profiled.reading_profile = Some(json!({"rate": 1.2, "style": "calm"}));
        let profiled = h.manager.submit(profiled).await.unwrap();
        assert_eq!(plain.segments[0].cache_key, profiled.segments[0].cache_key);
        assert_eq!(profiled.reading_profile, Some(json!({"rate": 1.2, "style": "calm"})));

        // fast 不支持音色：有效音色为空，指纹不变
        let mut voiced = JobRequest::new("Hello there.");
        voiced.voice_id = Some("p225".to_string());
        let voiced = h.manager.submit(voiced).await.unwrap();
        assert_eq!(voiced.voice_id.as_deref(), Some("p225"));
        assert_eq!(voiced.effective_voice_id, None);
        assert_eq!(plain.segments[0].cache_key, voiced.segments[0].cache_key);

        // quality 支持音色：不同音色不同指纹
        let mut a = JobRequest::new("Hello there.");
        a.model_id = Some("quality".to_string());
        a.voice_id = Some("p225".to_string());
        let mut b = a.clone();
        b.voice_id = Some("p226".to_string());
        let a = h.manager.submit(a).await.unwrap();
        let b = h.manager.submit(b).await.unwrap();
        assert_eq!(a.effective_voice_id.as_deref(), Some("p225"));
        assert_ne!(a.segments[0].cache_key, b.segments[0].cache_key);
    }

    #[tokio::test]
    async fn test_merge_waits_then_reuses() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap();

        match h.manager.merged_audio(&job.job_id).await.unwrap() {
            MergeOutcome::NotReady { status, progress } => {
                assert_eq!(status, JobStatus::Queued);
                assert_eq!(progress.total, 3);
                assert_eq!(progress.ready, 0);
            }
            MergeOutcome::Ready(_) => panic!("queued job must not merge"),
        }

        h.manager.process_job(&job.job_id).await.unwrap();

        let MergeOutcome::Ready(first) = h.manager.merged_audio(&job.job_id).await.unwrap() else {
            panic!("complete job must merge");
        };
        assert!(!first.reused);
        assert!(first.path.exists());
        assert_eq!(h.concat_calls.load(Ordering::SeqCst), 1);

        let MergeOutcome::Ready(second) = h.manager.merged_audio(&job.job_id).await.unwrap() else {
            panic!("complete job must merge");
        };
        assert!(second.reused);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(h.concat_calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            h.manager.merged_audio("missing").await.unwrap_err(),
            ApplicationError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_merge_without_ready_segments_fails() {
        let h = harness(|_, factory| {
            factory.behaviors.insert("fast".to_string(), Behavior::Fail);
        });
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager.process_job(&job.job_id).await.unwrap();

        assert!(matches!(
            h.manager.merged_audio(&job.job_id).await.unwrap_err(),
            ApplicationError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn test_cancel_releases_once_and_skips_processing() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap();

        let canceled = h.manager.cancel_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(canceled.status, JobStatus::Canceled);
        assert!(canceled
            .segments
            .iter()
            .all(|s| s.status == SegmentStatus::Canceled));
        assert_eq!(active_counter(&h.manager).await, 0);

        let again = h.manager.cancel_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(again.status, JobStatus::Canceled);
        assert_eq!(active_counter(&h.manager).await, 0);

        h.manager.process_job(&job.job_id).await.unwrap();
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 0);
        assert!(h.manager.cancel_job("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_job_segment_is_not_a_failure() {
        let h = harness(|_, _| {});
        let failed = h.manager.process_segment("missing", "seg").await.unwrap();
        assert!(!failed);
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_synthesis_discards_result() {
        let h = harness(|_, factory| factory.delay = Duration::from_millis(300));
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();

        let worker = {
            let manager = h.manager.clone();
            let job_id = job.job_id.clone();
            tokio::spawn(async move { manager.process_job(&job_id).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.manager.cancel_job(&job.job_id).await.unwrap();
        worker.await.unwrap().unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Canceled);
        assert_eq!(done.segments[0].status, SegmentStatus::Canceled);
        assert!(done.segments[0].path.is_none());
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 1);
        assert_eq!(active_counter(&h.manager).await, 0);
    }

    #[tokio::test]
    async fn test_retry_cap_marks_segment_error() {
        let h = harness(|settings, _| settings.segment_max_retries = 0);
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager
            .jobs
            .update(&job.job_id, |job| job.segments[0].attempts = 1)
            .await
            .unwrap();

        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::CompleteWithErrors);
        assert_eq!(
            done.segments[0].error_code,
            Some(SegmentErrorCode::RetryCapExceeded)
        );
        assert_eq!(h.synth_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.manager.metrics().snapshot().segment_retry_caps, 1);
    }

    #[tokio::test]
    async fn test_retry_is_counted() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager
            .jobs
            .update(&job.job_id, |job| job.segments[0].attempts = 1)
            .await
            .unwrap();

        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.segments[0].status, SegmentStatus::Ready);
        assert_eq!(done.segments[0].attempts, 2);
        assert_eq!(h.manager.metrics().snapshot().segment_retries, 1);
    }

    #[tokio::test]
    async fn test_stale_synthesizing_segment_is_reclaimed() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new("Hello there world.")).await.unwrap();
        h.manager
            .jobs
            .update(&job.job_id, |job| {
                job.segments[0].status = SegmentStatus::Synthesizing;
                job.segments[0].started_at = Some(chrono::Utc::now() - chrono::Duration::hours(1));
            })
            .await
            .unwrap();

        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.segments[0].status, SegmentStatus::Ready);
        assert_eq!(done.segments[0].stale_requeues, 1);
    }

    async fn age_job(h: &test_support::Harness, job_id: &str, hours: i64) {
        let mut job = h.manager.jobs.get(job_id).await.unwrap().unwrap();
        job.updated_at = chrono::Utc::now() - chrono::Duration::hours(hours);
        h.manager.jobs.insert(&job).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_queued_needs_live_worker() {
        let h = harness(|settings, _| settings.stale_queued_secs = 60);
        let job = h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        age_job(&h, &job.job_id, 2).await;

        // 没有在线 worker：保留
        assert_eq!(h.manager.active_jobs().await.unwrap(), 1);

        h.coordination
            .heartbeat("w1", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(h.manager.active_jobs().await.unwrap(), 0);

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Canceled);
        assert_eq!(done.error_code, Some(JobErrorCode::StaleQueued));
        assert_eq!(done.error.as_deref(), Some("stale queued job"));
        assert_eq!(h.manager.metrics().snapshot().stale_queued_cancels, 1);
        assert_eq!(active_counter(&h.manager).await, 0);
    }

    #[tokio::test]
    async fn test_abandoned_queued_job_is_reclaimed_without_workers() {
        let h = harness(|settings, _| {
            settings.stale_queued_secs = 60;
            settings.stale_queued_abandoned_secs = 3600;
        });
        let job = h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        age_job(&h, &job.job_id, 2).await;

        assert_eq!(h.manager.active_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claimed_queued_job_is_not_stale() {
        let h = harness(|settings, _| {
            settings.stale_queued_secs = 60;
            settings.stale_queued_require_workers = false;
        });
        let job = h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        age_job(&h, &job.job_id, 2).await;
        h.coordination
            .set(&claim_key(&job.job_id), "w1", Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(h.manager.active_jobs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reconciliation_drops_finished_and_missing_jobs() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        h.coordination
            .delete(&JobStore::key(&job.job_id))
            .await
            .unwrap();

        assert_eq!(h.manager.active_jobs().await.unwrap(), 0);
        assert_eq!(active_counter(&h.manager).await, 0);
    }

    #[tokio::test]
    async fn test_admission_during_reconciliation_is_kept() {
        let coordination = Arc::new(AdmitDuringSnapshot::new("concurrent-job", 2));
        let admitted = coordination.admitted.clone();
        let h = harness_on(coordination, |settings, _| settings.max_active_jobs = 2);

        h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        assert_eq!(h.manager.active_jobs().await.unwrap(), 1);
        assert_eq!(admitted.load(Ordering::SeqCst), 1);

        // 对账不能抹掉并发写入的名额
        assert_eq!(active_counter(&h.manager).await, 2);
        assert!(matches!(
            h.manager.submit(JobRequest::new("One too many.")).await.unwrap_err(),
            ApplicationError::Submit(SubmitError::TooManyActiveJobs)
        ));
        assert_eq!(active_counter(&h.manager).await, 2);
    }

    #[tokio::test]
    async fn test_rejected_submit_leaves_no_job_record() {
        let h = harness(|settings, _| settings.max_active_jobs = 1);
        h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        let _ = h.manager.submit(JobRequest::new("Rejected one.")).await.unwrap_err();

        assert_eq!(h.coordination.scan_keys(JOB_KEY_PREFIX).await.unwrap().len(), 1);
        assert_eq!(h.manager.queue_length().await, 1);
    }

    #[tokio::test]
    async fn test_orphaned_in_progress_job_is_requeued_once() {
        let h = harness(|_, _| {});
        let job = h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();
        h.coordination
            .dequeue(JOB_QUEUE, Duration::from_millis(10))
            .await
            .unwrap();
        h.manager
            .jobs
            .update(&job.job_id, |job| job.mark_in_progress())
            .await
            .unwrap();

        assert_eq!(h.manager.requeue_orphans().await.unwrap(), 1);
        assert_eq!(h.manager.requeue_orphans().await.unwrap(), 0);
        assert_eq!(h.manager.queue_length().await, 1);
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let h = harness(|_, _| {});
        h.manager.submit(JobRequest::new("Hello there.")).await.unwrap();

        let status = h.manager.status_snapshot().await;
        assert_eq!(status.queue_len, 1);
        assert_eq!(status.active_jobs, 1);
        assert_eq!(status.workers_online, 0);
        assert_eq!(status.retry_counts.segment_retries, 0);
    }

    #[tokio::test]
    async fn test_parallel_fan_out_completes() {
        let h = harness(|settings, _| {
            settings.per_job_workers = 2;
            settings.max_concurrent_segments = 2;
        });
        let job = h.manager.submit(JobRequest::new(THREE_SENTENCES)).await.unwrap();
        h.manager.process_job(&job.job_id).await.unwrap();

        let done = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Complete);
        assert_eq!(done.progress().ready, 3);
        assert_eq!(done.progress().percent, 100.0);
    }
}
