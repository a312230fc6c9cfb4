//! Job Worker - 后台任务分发循环
//!
//! 从协调后端队列取任务，认领后交给 JobManager 处理

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::application::scheduler::{claim_key, JobManager, JOB_QUEUE};

/// Worker 配置
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    pub worker_id: String,
    /// 最大并发任务数
    pub max_concurrent: usize,
    /// 阻塞出队超时，保证能及时响应关闭信号
    pub dequeue_timeout: Duration,
    /// 认领标记 TTL
    pub claim_ttl: Duration,
    /// 认领标记续期间隔
    pub claim_refresh: Duration,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: crate::domain::job::new_hex_id(),
            max_concurrent: 1,
            dequeue_timeout: Duration::from_secs(5),
            claim_ttl: Duration::from_secs(60),
            claim_refresh: Duration::from_secs(20),
        }
    }
}

/// 任务 Worker
pub struct JobWorker {
    config: JobWorkerConfig,
    manager: Arc<JobManager>,
    shutdown: CancellationToken,
}

impl JobWorker {
    pub fn new(config: JobWorkerConfig, manager: Arc<JobManager>, shutdown: CancellationToken) -> Self {
        Self {
            config,
            manager,
            shutdown,
        }
    }

    /// 启动分发循环，直到收到关闭信号
    pub async fn run(self) {
        tracing::info!(
            worker_id = %self.config.worker_id,
            max_concurrent = self.config.max_concurrent,
            backend = self.manager.coordination().backend_name(),
            "JobWorker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));

        loop {
            // 先拿到执行名额再出队，避免拿走无法立即执行的任务
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let dequeued = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                res = self
                    .manager
                    .coordination()
                    .dequeue(JOB_QUEUE, self.config.dequeue_timeout) => res,
            };

            let job_id = match dequeued {
                Ok(Some(job_id)) => job_id,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Dequeue failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let manager = self.manager.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let _permit = permit; // 持有 permit 直到任务完成
                Self::run_claimed(&config, manager, &job_id).await;
            });
        }

        tracing::info!(worker_id = %self.config.worker_id, "JobWorker stopped");
    }

    /// 认领并处理单个任务
    async fn run_claimed(config: &JobWorkerConfig, manager: Arc<JobManager>, job_id: &str) {
        let coordination = manager.coordination().clone();
        let key = claim_key(job_id);

        match coordination
            .set_nx(&key, &config.worker_id, config.claim_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(job_id = %job_id, "Job already claimed, skipping");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Failed to claim job");
                return;
            }
        }

        let refresher = {
            let coordination = coordination.clone();
            let key = key.clone();
            let worker_id = config.worker_id.clone();
            let ttl = config.claim_ttl;
            let every = config.claim_refresh;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = coordination.set(&key, &worker_id, Some(ttl)).await {
                        tracing::warn!(key = %key, error = %e, "Failed to refresh job claim");
                    }
                }
            })
        };

        tracing::debug!(job_id = %job_id, worker_id = %config.worker_id, "Job claimed");
        if let Err(e) = manager.process_job(job_id).await {
            tracing::error!(job_id = %job_id, error = %e, "Job processing failed");
        }

        refresher.abort();
        if let Err(e) = coordination.delete(&key).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to drop job claim");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scheduler::test_support::harness;
    use crate::application::scheduler::JobRequest;
    use crate::domain::job::JobStatus;

    fn fast_config() -> JobWorkerConfig {
        JobWorkerConfig {
            worker_id: "w1".to_string(),
            max_concurrent: 2,
            dequeue_timeout: Duration::from_millis(50),
            claim_ttl: Duration::from_secs(5),
            claim_refresh: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_worker_processes_queued_job() {
        let h = harness(|_, _| {});
        let job = h
            .manager
            .submit(JobRequest::new("Worker loop picks this job up."))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            JobWorker::new(fast_config(), h.manager.clone(), shutdown.clone()).run(),
        );

        let mut status = JobStatus::Queued;
        for _ in 0..100 {
            status = h.manager.get_job(&job.job_id).await.unwrap().unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, JobStatus::Complete);

        // 处理完毕后认领标记被删除
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!h.coordination.exists(&claim_key(&job.job_id)).await.unwrap());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_claimed_job_is_skipped() {
        let h = harness(|_, _| {});
        let job = h
            .manager
            .submit(JobRequest::new("Someone else owns this one."))
            .await
            .unwrap();
        h.coordination
            .set_nx(&claim_key(&job.job_id), "other", Duration::from_secs(5))
            .await
            .unwrap();

        JobWorker::run_claimed(&fast_config(), h.manager.clone(), &job.job_id).await;

        let current = h.manager.get_job(&job.job_id).await.unwrap().unwrap();
        assert_eq!(current.status, JobStatus::Queued);
        assert_eq!(h.synth_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
