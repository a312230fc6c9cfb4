//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：任务提交/取消、词典学习与刷新

mod dict_commands;
mod job_commands;

pub mod handlers;

pub use dict_commands::*;
pub use job_commands::*;
