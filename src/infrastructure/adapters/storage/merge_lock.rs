//! Merge Lock - 合并锁实现
//!
//! 单进程用任务目录下的 merge.lock 文件锁；多进程用协调后端的锁

use async_trait::async_trait;
use dashmap::DashMap;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::application::ports::{CoordinationError, CoordinationPort, MergeLockPort};
use crate::domain::job::new_hex_id;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 文件锁
pub struct FileMergeLock {
    /// 任务目录的根目录
    base_dir: PathBuf,
    /// token -> 持有锁的文件句柄
    held: DashMap<String, File>,
}

impl FileMergeLock {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            held: DashMap::new(),
        }
    }

    fn lock_path(&self, job_id: &str) -> PathBuf {
        self.base_dir.join(job_id).join("merge.lock")
    }

    fn open(&self, job_id: &str) -> Result<File, CoordinationError> {
        let path = self.lock_path(job_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoordinationError::Backend(e.to_string()))?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CoordinationError::Backend(e.to_string()))
    }
}

#[async_trait]
impl MergeLockPort for FileMergeLock {
    async fn acquire(
        &self,
        job_id: &str,
        wait: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        let file = self.open(job_id)?;
        let deadline = Instant::now() + wait;
        loop {
            if file.try_lock_exclusive().is_ok() {
                let token = new_hex_id();
                self.held.insert(token.clone(), file);
                return Ok(Some(token));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    async fn release(&self, job_id: &str, token: &str) -> Result<(), CoordinationError> {
        if let Some((_, file)) = self.held.remove(token) {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to unlock merge lock file");
            }
        }
        Ok(())
    }
}

/// 协调后端锁
pub struct CoordinationMergeLock {
    coordination: Arc<dyn CoordinationPort>,
    ttl: Duration,
}

impl CoordinationMergeLock {
    pub fn new(coordination: Arc<dyn CoordinationPort>, ttl: Duration) -> Self {
        Self { coordination, ttl }
    }

    fn lock_name(job_id: &str) -> String {
        format!("merge:{}", job_id)
    }
}

#[async_trait]
impl MergeLockPort for CoordinationMergeLock {
    async fn acquire(
        &self,
        job_id: &str,
        wait: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        self.coordination
            .try_lock(&Self::lock_name(job_id), self.ttl, wait)
            .await
    }

    async fn release(&self, job_id: &str, token: &str) -> Result<(), CoordinationError> {
        self.coordination
            .unlock(&Self::lock_name(job_id), token)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::InMemoryCoordination;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let first = FileMergeLock::new(dir.path());
        let second = FileMergeLock::new(dir.path());
        let wait = Duration::from_millis(50);

        let token = first.acquire("job1", wait).await.unwrap().unwrap();
        assert!(second.acquire("job1", wait).await.unwrap().is_none());
        assert!(second.acquire("job2", wait).await.unwrap().is_some());

        first.release("job1", &token).await.unwrap();
        assert!(second.acquire("job1", wait).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_coordination_lock_round_trip() {
        let coordination: Arc<dyn CoordinationPort> = Arc::new(InMemoryCoordination::new());
        let lock = CoordinationMergeLock::new(coordination, Duration::from_secs(60));
        let wait = Duration::from_millis(30);

        let token = lock.acquire("job1", wait).await.unwrap().unwrap();
        assert!(lock.acquire("job1", wait).await.unwrap().is_none());
        lock.release("job1", &token).await.unwrap();
        assert!(lock.acquire("job1", wait).await.unwrap().is_some());
    }
}
