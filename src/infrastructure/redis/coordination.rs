//! Redis Coordination Backend
//!
//! 多进程部署使用；所有键带统一命名空间前缀
//! - 读改写：GET + Lua compare-and-set，有限次重试
//! - 队列：RPUSH / BLPOP（阻塞出队走独立连接）
//! - 锁：SET NX PX + 令牌校验删除
//! - 有界计数器：有序集合（成员 → 过期时间），计数即未过期成员数，由 Lua 脚本原子判断

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::ports::{
    CoordinationError, CoordinationPort, UpdateFn, UPDATE_RETRY_BUDGET,
};
use crate::domain::job::new_hex_id;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SCAN_BATCH: usize = 500;

/// 值未变化时写入；ARGV[3] 为空表示保留原 TTL
const CAS_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) ~= ARGV[1] then
  return 0
end
if ARGV[3] ~= '' then
  redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
else
  redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
end
return 1
"#;

const UNLOCK_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// KEYS: counter；ARGV: member, limit, now(ms), expires_at(ms)
const COUNTER_ACQUIRE_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[3])
if redis.call('ZSCORE', KEYS[1], ARGV[1]) then
  return 0
end
if redis.call('ZCARD', KEYS[1]) >= tonumber(ARGV[2]) then
  return 0
end
redis.call('ZADD', KEYS[1], ARGV[4], ARGV[1])
return 1
"#;

/// KEYS: counter；ARGV: member, now(ms)
const COUNTER_RELEASE_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[2])
return redis.call('ZREM', KEYS[1], ARGV[1])
"#;

/// Redis 协调后端配置
#[derive(Debug, Clone)]
pub struct RedisCoordinationConfig {
    pub url: String,
    /// 键命名空间前缀，如 "pronouncex:"
    pub key_prefix: String,
}

impl Default for RedisCoordinationConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "pronouncex:".to_string(),
        }
    }
}

/// Redis 协调后端
pub struct RedisCoordination {
    conn: MultiplexedConnection,
    /// BLPOP 会占住连接，单独使用
    blocking: Mutex<MultiplexedConnection>,
    prefix: String,
    cas: Script,
    unlock: Script,
    counter_acquire: Script,
    counter_release: Script,
}

fn backend(e: redis::RedisError) -> CoordinationError {
    CoordinationError::Backend(e.to_string())
}

fn millis(d: Duration) -> u64 {
    (d.as_millis() as u64).max(1)
}

/// 计数器成员的过期时间用墙钟毫秒，跨进程可比较
fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 转义 glob 特殊字符
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl RedisCoordination {
    pub async fn connect(config: &RedisCoordinationConfig) -> Result<Self, CoordinationError> {
        let client = Client::open(config.url.as_str()).map_err(backend)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;
        let blocking = client
            .get_multiplexed_async_connection()
            .await
            .map_err(backend)?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "Redis coordination connected");

        Ok(Self {
            conn,
            blocking: Mutex::new(blocking),
            prefix: config.key_prefix.clone(),
            cas: Script::new(CAS_SCRIPT),
            unlock: Script::new(UNLOCK_SCRIPT),
            counter_acquire: Script::new(COUNTER_ACQUIRE_SCRIPT),
            counter_release: Script::new(COUNTER_RELEASE_SCRIPT),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn queue_key(&self, queue: &str) -> String {
        format!("{}queue:{}", self.prefix, queue)
    }

    fn lock_key(&self, name: &str) -> String {
        format!("{}lock:{}", self.prefix, name)
    }

    fn counter_key(&self, counter: &str) -> String {
        format!("{}slots:{}", self.prefix, counter)
    }

    fn heartbeat_prefix(&self) -> String {
        format!("{}worker:", self.prefix)
    }

    /// SCAN 出全部以 full_prefix 开头的键，返回去掉 full_prefix 的部分
    async fn scan_stripped(&self, full_prefix: &str) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_glob(full_prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|k| k.strip_prefix(full_prefix).map(str::to_string)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

#[async_trait]
impl CoordinationPort for RedisCoordination {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        true
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(backend)?;
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        mutator: &mut UpdateFn<'_>,
    ) -> Result<Option<String>, CoordinationError> {
        let full_key = self.key(key);
        let ttl_arg = ttl.map(|t| millis(t).to_string()).unwrap_or_default();
        let mut conn = self.conn.clone();

        for attempt in 1..=UPDATE_RETRY_BUDGET {
            let current: Option<String> = redis::cmd("GET")
                .arg(&full_key)
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            let Some(current) = current else {
                return Ok(None);
            };

            let next = mutator(&current)?;
            let written: i64 = self
                .cas
                .key(&full_key)
                .arg(&current)
                .arg(&next)
                .arg(&ttl_arg)
                .invoke_async(&mut conn)
                .await
                .map_err(backend)?;
            if written == 1 {
                return Ok(Some(next));
            }
            tracing::debug!(key = %key, attempt, "Optimistic update conflict, retrying");
        }

        tracing::warn!(key = %key, attempts = UPDATE_RETRY_BUDGET, "Optimistic update gave up");
        Err(CoordinationError::Contention {
            key: key.to_string(),
            attempts: UPDATE_RETRY_BUDGET,
        })
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(reply.is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let n: i64 = redis::cmd("EXISTS")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(n > 0)
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.key(key))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CoordinationError> {
        let full = self.key(prefix);
        let stripped = self.scan_stripped(&full).await?;
        Ok(stripped
            .into_iter()
            .map(|rest| format!("{}{}", prefix, rest))
            .collect())
    }

    async fn enqueue(&self, queue: &str, value: &str) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("RPUSH")
            .arg(self.queue_key(queue))
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn dequeue(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        let mut conn = self.blocking.lock().await;
        // BLPOP 的 0 表示永久阻塞
        let secs = timeout.as_secs_f64().max(0.01);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(self.queue_key(queue))
            .arg(secs)
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn queue_len(&self, queue: &str) -> Result<usize, CoordinationError> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN")
            .arg(self.queue_key(queue))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(len)
    }

    async fn try_lock(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        let key = self.lock_key(name);
        let token = new_hex_id();
        let deadline = Instant::now() + wait;
        let mut conn = self.conn.clone();
        loop {
            let reply: Option<String> = redis::cmd("SET")
                .arg(&key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(backend)?;
            if reply.is_some() {
                return Ok(Some(token));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::time::sleep(remaining.min(LOCK_POLL_INTERVAL)).await;
        }
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .unlock
            .key(self.lock_key(name))
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn counter_acquire(
        &self,
        counter: &str,
        member: &str,
        limit: usize,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let now = now_millis();
        let mut conn = self.conn.clone();
        let acquired: i64 = self
            .counter_acquire
            .key(self.counter_key(counter))
            .arg(member)
            .arg(limit)
            .arg(now)
            .arg(now + millis(ttl) as i64)
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(acquired == 1)
    }

    async fn counter_release(
        &self,
        counter: &str,
        member: &str,
    ) -> Result<bool, CoordinationError> {
        let mut conn = self.conn.clone();
        let released: i64 = self
            .counter_release
            .key(self.counter_key(counter))
            .arg(member)
            .arg(now_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(released == 1)
    }

    async fn counter_members(&self, counter: &str) -> Result<Vec<String>, CoordinationError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZRANGEBYSCORE")
            .arg(self.counter_key(counter))
            .arg(format!("({}", now_millis()))
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(backend)
    }

    async fn counter_get(&self, counter: &str) -> Result<usize, CoordinationError> {
        let mut conn = self.conn.clone();
        let count: usize = redis::cmd("ZCOUNT")
            .arg(self.counter_key(counter))
            .arg(format!("({}", now_millis()))
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(count)
    }

    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> Result<(), CoordinationError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(format!("{}{}", self.heartbeat_prefix(), worker_id))
            .arg(chrono::Utc::now().timestamp())
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn live_workers(&self) -> Result<usize, CoordinationError> {
        Ok(self.scan_stripped(&self.heartbeat_prefix()).await?.len())
    }
}
