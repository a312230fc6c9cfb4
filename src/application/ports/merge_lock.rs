//! Merge Lock Port - 合并锁
//!
//! 每个任务一把锁，本地用文件锁，分布式用协调后端的锁

use std::time::Duration;

use async_trait::async_trait;

use super::CoordinationError;

/// Merge Lock Port
#[async_trait]
pub trait MergeLockPort: Send + Sync {
    /// 尝试加锁，最多等待 wait；未拿到锁返回 None
    async fn acquire(&self, job_id: &str, wait: Duration)
        -> Result<Option<String>, CoordinationError>;

    async fn release(&self, job_id: &str, token: &str) -> Result<(), CoordinationError>;
}
