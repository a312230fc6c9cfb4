//! 应用层 - 查询（读操作）
//!
//! CQRS 查询侧：任务状态、片段、播放列表、合并音频、运行指标与词典

mod dict_queries;
mod job_queries;

pub mod handlers;

pub use dict_queries::*;
pub use job_queries::*;
