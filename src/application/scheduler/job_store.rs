//! 任务存储
//!
//! 任务以 JSON 存放在协调后端 `job:{id}` 下，所有修改都经过原子读改写

use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{CoordinationError, CoordinationPort};
use crate::domain::job::Job;

/// 任务键前缀
pub const JOB_KEY_PREFIX: &str = "job:";

/// 任务存储
#[derive(Clone)]
pub struct JobStore {
    coordination: Arc<dyn CoordinationPort>,
    ttl: Duration,
}

fn decode(raw: &str) -> Result<Job, CoordinationError> {
    serde_json::from_str(raw).map_err(|e| CoordinationError::Serialization(e.to_string()))
}

fn encode(job: &Job) -> Result<String, CoordinationError> {
    serde_json::to_string(job).map_err(|e| CoordinationError::Serialization(e.to_string()))
}

impl JobStore {
    pub fn new(coordination: Arc<dyn CoordinationPort>, ttl: Duration) -> Self {
        Self { coordination, ttl }
    }

    pub fn key(job_id: &str) -> String {
        format!("{}{}", JOB_KEY_PREFIX, job_id)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, CoordinationError> {
        match self.coordination.get(&Self::key(job_id)).await? {
            Some(raw) => decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, job: &Job) -> Result<(), CoordinationError> {
        let raw = encode(job)?;
        self.coordination
            .set(&Self::key(&job.job_id), &raw, Some(self.ttl))
            .await
    }

    /// 原子修改任务
    ///
    /// apply 可能因冲突被重复调用，每次都作用于最新读到的值；
    /// 返回最终写入的任务和最后一次 apply 的返回值，任务不存在时返回 None
    pub async fn update<R, F>(
        &self,
        job_id: &str,
        mut apply: F,
    ) -> Result<Option<(Job, R)>, CoordinationError>
    where
        R: Send,
        F: FnMut(&mut Job) -> R + Send,
    {
        let mut output: Option<R> = None;
        let mut mutator = |raw: &str| -> Result<String, CoordinationError> {
            let mut job = decode(raw)?;
            let result = apply(&mut job);
            job.touch();
            output = Some(result);
            encode(&job)
        };

        let written = self
            .coordination
            .update(&Self::key(job_id), Some(self.ttl), &mut mutator)
            .await?;

        match (written, output) {
            (Some(raw), Some(result)) => Ok(Some((decode(&raw)?, result))),
            _ => Ok(None),
        }
    }

    /// 当前存储中的全部任务 ID
    pub async fn job_ids(&self) -> Result<Vec<String>, CoordinationError> {
        let keys = self.coordination.scan_keys(JOB_KEY_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(JOB_KEY_PREFIX).map(str::to_string))
            .collect())
    }
}
