//! Coordination Port - 协调后端抽象
//!
//! 单进程（内存）与多进程（Redis）部署共用同一套语义：
//! - 键值存储（带过期时间）与乐观读改写
//! - 阻塞 FIFO 队列
//! - 带超时的互斥锁
//! - 有界计数器（带成员标记，防止重复释放）
//! - 基于 TTL 的 worker 心跳

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 乐观更新的重试预算
pub const UPDATE_RETRY_BUDGET: usize = 10;

/// 协调后端错误
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Update contention on key {key} after {attempts} attempts")]
    Contention { key: String, attempts: usize },

    #[error("Update aborted: {0}")]
    Aborted(String),
}

/// 读改写函数
///
/// 输入当前值，返回新值；返回错误时放弃本次更新
pub type UpdateFn<'a> = dyn FnMut(&str) -> Result<String, CoordinationError> + Send + 'a;

/// Coordination Port
#[async_trait]
pub trait CoordinationPort: Send + Sync {
    /// 后端名称（日志用）
    fn backend_name(&self) -> &'static str;

    /// 是否为跨进程共享的后端
    fn is_distributed(&self) -> bool;

    // ========== 键值存储 ==========

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError>;

    /// 原子读改写
    ///
    /// 键不存在时返回 None；分布式实现在重试预算耗尽后返回 `Contention`
    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        mutator: &mut UpdateFn<'_>,
    ) -> Result<Option<String>, CoordinationError>;

    /// 不存在时写入，返回是否写入成功
    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError>;

    async fn delete(&self, key: &str) -> Result<(), CoordinationError>;

    /// 列出以 prefix 开头的未过期键
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CoordinationError>;

    // ========== 队列 ==========

    async fn enqueue(&self, queue: &str, value: &str) -> Result<(), CoordinationError>;

    /// 阻塞出队，超时返回 None
    async fn dequeue(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, CoordinationError>;

    async fn queue_len(&self, queue: &str) -> Result<usize, CoordinationError>;

    // ========== 锁 ==========

    /// 尝试加锁，最多等待 wait；成功返回锁令牌
    async fn try_lock(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<String>, CoordinationError>;

    /// 释放锁（令牌不匹配时不做任何事）
    async fn unlock(&self, name: &str, token: &str) -> Result<bool, CoordinationError>;

    // ========== 有界计数器 ==========

    /// 未过期成员数未达上限且该成员不存在时写入成员标记
    ///
    /// 计数值始终等于未过期成员数，判断与写入是原子的
    async fn counter_acquire(
        &self,
        counter: &str,
        member: &str,
        limit: usize,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    /// 删除成员标记，返回标记是否存在
    async fn counter_release(&self, counter: &str, member: &str)
        -> Result<bool, CoordinationError>;

    /// 当前持有标记的成员
    async fn counter_members(&self, counter: &str) -> Result<Vec<String>, CoordinationError>;

    async fn counter_get(&self, counter: &str) -> Result<usize, CoordinationError>;

    // ========== 心跳 ==========

    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> Result<(), CoordinationError>;

    /// 未过期心跳数量
    async fn live_workers(&self) -> Result<usize, CoordinationError>;
}
