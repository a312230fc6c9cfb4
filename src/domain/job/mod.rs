//! Job Context - 合成任务限界上下文
//!
//! 职责:
//! - Job 聚合（片段清单、计数器、状态流转）
//! - 片段状态机
//! - 进度计算

mod aggregate;
mod value_objects;

pub use aggregate::{new_hex_id, Job, NewJob, Segment};
pub use value_objects::{
    round3, short_error, JobErrorCode, JobProgress, JobStatus, SegmentErrorCode, SegmentStatus,
    SegmentTimings,
};
