//! Worker 心跳与孤儿任务回收

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::CoordinationPort;
use crate::application::scheduler::JobManager;

/// 心跳配置
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub ttl: Duration,
    pub interval: Duration,
    /// 孤儿任务扫描间隔
    pub sweep_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            interval: Duration::from_secs(2),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// 定期写入 worker 心跳
pub fn spawn_heartbeat(
    coordination: Arc<dyn CoordinationPort>,
    worker_id: String,
    config: HeartbeatConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = coordination.heartbeat(&worker_id, config.ttl).await {
                        tracing::warn!(worker_id = %worker_id, error = %e, "Heartbeat failed");
                    }
                }
            }
        }
        tracing::debug!(worker_id = %worker_id, "Heartbeat stopped");
    })
}

/// 定期把处理中但无人认领的任务重新入队
pub fn spawn_orphan_sweeper(
    manager: Arc<JobManager>,
    config: HeartbeatConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match manager.requeue_orphans().await {
                        Ok(0) => {}
                        Ok(count) => tracing::info!(count, "Orphan sweep requeued jobs"),
                        Err(e) => tracing::warn!(error = %e, "Orphan sweep failed"),
                    }
                }
            }
        }
    })
}
