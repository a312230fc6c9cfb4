//! Worker Layer - 后台任务处理
//!
//! 分发循环、心跳与孤儿任务回收

mod heartbeat;
mod job_worker;

pub use heartbeat::{spawn_heartbeat, spawn_orphan_sweeper, HeartbeatConfig};
pub use job_worker::{JobWorker, JobWorkerConfig};
