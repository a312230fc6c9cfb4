//! In-Memory Coordination Backend
//!
//! 单进程部署使用：键值、队列、锁、计数器与心跳全部在进程内存中

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::application::ports::{CoordinationError, CoordinationPort, UpdateFn};
use crate::domain::job::new_hex_id;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Instant::now())
    }
}

struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// 计数值即未过期的成员数
#[derive(Default)]
struct CounterState {
    /// counter -> (member -> 标记过期时间)
    members: HashMap<String, HashMap<String, Instant>>,
}

impl CounterState {
    fn live_members(&mut self, counter: &str) -> Option<&mut HashMap<String, Instant>> {
        let now = Instant::now();
        let members = self.members.get_mut(counter)?;
        members.retain(|_, expires_at| *expires_at > now);
        Some(members)
    }
}

/// 内存协调后端
pub struct InMemoryCoordination {
    kv: DashMap<String, Entry>,
    queues: DashMap<String, VecDeque<String>>,
    queue_notify: Notify,
    locks: DashMap<String, LockEntry>,
    lock_notify: Notify,
    counters: Mutex<CounterState>,
    heartbeats: DashMap<String, Instant>,
}

impl Default for InMemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordination {
    pub fn new() -> Self {
        Self {
            kv: DashMap::new(),
            queues: DashMap::new(),
            queue_notify: Notify::new(),
            locks: DashMap::new(),
            lock_notify: Notify::new(),
            counters: Mutex::new(CounterState::default()),
            heartbeats: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn pop(&self, queue: &str) -> Option<String> {
        self.queues.get_mut(queue).and_then(|mut q| q.pop_front())
    }

    fn try_lock_once(&self, name: &str, ttl: Duration) -> Option<String> {
        let now = Instant::now();
        let token = new_hex_id();
        match self.locks.entry(name.to_string()) {
            MapEntry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return None;
                }
                held.insert(LockEntry {
                    token: token.clone(),
                    expires_at: now + ttl,
                });
            }
            MapEntry::Vacant(slot) => {
                slot.insert(LockEntry {
                    token: token.clone(),
                    expires_at: now + ttl,
                });
            }
        }
        Some(token)
    }
}

#[async_trait]
impl CoordinationPort for InMemoryCoordination {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let value = match self.kv.get(key) {
            Some(entry) if entry.is_live() => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.kv.remove_if(key, |_, entry| !entry.is_live());
        }
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError> {
        self.kv
            .insert(key.to_string(), Entry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        mutator: &mut UpdateFn<'_>,
    ) -> Result<Option<String>, CoordinationError> {
        // 持有分片写锁期间完成读改写
        let Some(mut entry) = self.kv.get_mut(key) else {
            return Ok(None);
        };
        if !entry.is_live() {
            return Ok(None);
        }
        let next = mutator(&entry.value)?;
        if let Some(ttl) = ttl {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        entry.value = next.clone();
        Ok(Some(next))
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        match self.kv.entry(key.to_string()) {
            MapEntry::Occupied(mut existing) => {
                if existing.get().is_live() {
                    return Ok(false);
                }
                existing.insert(Entry::new(value.to_string(), Some(ttl)));
            }
            MapEntry::Vacant(slot) => {
                slot.insert(Entry::new(value.to_string(), Some(ttl)));
            }
        }
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError> {
        Ok(self.kv.get(key).map_or(false, |entry| entry.is_live()))
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.kv.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CoordinationError> {
        Ok(self
            .kv
            .iter()
            .filter(|item| item.key().starts_with(prefix) && item.value().is_live())
            .map(|item| item.key().clone())
            .collect())
    }

    async fn enqueue(&self, queue: &str, value: &str) -> Result<(), CoordinationError> {
        self.queues
            .entry(queue.to_string())
            .or_default()
            .push_back(value.to_string());
        self.queue_notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.queue_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop(queue) {
                return Ok(Some(value));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(self.pop(queue));
            }
        }
    }

    async fn queue_len(&self, queue: &str) -> Result<usize, CoordinationError> {
        Ok(self.queues.get(queue).map_or(0, |q| q.len()))
    }

    async fn try_lock(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.lock_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(token) = self.try_lock_once(name, ttl) {
                return Ok(Some(token));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            // 持锁方可能直接过期而不释放，定期重试
            let _ = tokio::time::timeout(remaining.min(Duration::from_millis(50)), notified).await;
        }
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool, CoordinationError> {
        let removed = self
            .locks
            .remove_if(name, |_, held| held.token == token)
            .is_some();
        if removed {
            self.lock_notify.notify_waiters();
        }
        Ok(removed)
    }

    async fn counter_acquire(
        &self,
        counter: &str,
        member: &str,
        limit: usize,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let mut state = self.counters.lock();
        let now = Instant::now();
        let members = state.members.entry(counter.to_string()).or_default();
        members.retain(|_, expires_at| *expires_at > now);
        if members.contains_key(member) || members.len() >= limit {
            return Ok(false);
        }
        members.insert(member.to_string(), now + ttl);
        Ok(true)
    }

    async fn counter_release(
        &self,
        counter: &str,
        member: &str,
    ) -> Result<bool, CoordinationError> {
        let mut state = self.counters.lock();
        Ok(state
            .live_members(counter)
            .map_or(false, |members| members.remove(member).is_some()))
    }

    async fn counter_members(&self, counter: &str) -> Result<Vec<String>, CoordinationError> {
        let mut state = self.counters.lock();
        Ok(state
            .live_members(counter)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn counter_get(&self, counter: &str) -> Result<usize, CoordinationError> {
        let mut state = self.counters.lock();
        Ok(state.live_members(counter).map_or(0, |members| members.len()))
    }

    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> Result<(), CoordinationError> {
        self.heartbeats
            .insert(worker_id.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn live_workers(&self) -> Result<usize, CoordinationError> {
        let now = Instant::now();
        self.heartbeats.retain(|_, expires_at| *expires_at > now);
        Ok(self.heartbeats.len())
    }
}
