//! PronounceX - 长文本 TTS 任务服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Job: 任务与片段状态机
//! - Pronunciation: 词典包、自动学习、发音解析
//! - 文本规范化与分段
//!
//! 应用层 (application/):
//! - Ports: 协调后端、片段缓存、合成引擎、编码器、合并锁
//! - Scheduler: 提交准入、片段处理、合并、回收
//! - Commands / Queries: CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API
//! - Memory / Redis: 协调后端
//! - Worker: 任务分发、心跳、孤儿回收
//! - Persistence: Sled 缓存索引 + 词典文件
//! - Adapters: 合成引擎、音素化器、编码器、合并锁

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
