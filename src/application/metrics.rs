//! 调度器指标
//!
//! 原子计数器，派生比率在读取时计算

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::domain::job::round3;

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_jobs: u64,
    pub total_segments: u64,
    pub total_chars: u64,
    pub total_duration_sec: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub error_segments: u64,
    pub segment_retries: u64,
    pub segment_retry_caps: u64,
    pub fallback_segments: u64,
    pub merge_lock_waits: u64,
    pub merge_lock_wait_ms: f64,
    pub merge_lock_wait_max_ms: f64,
    pub stale_queued_cancels: u64,
}

impl MetricsSnapshot {
    pub fn cache_hit_rate(&self) -> f64 {
        let denom = self.cache_hits + self.cache_misses;
        if denom == 0 {
            0.0
        } else {
            self.cache_hits as f64 / denom as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total_segments == 0 {
            0.0
        } else {
            self.error_segments as f64 / self.total_segments as f64
        }
    }

    pub fn avg_chars_per_sec(&self) -> f64 {
        if self.total_duration_sec <= 0.0 {
            0.0
        } else {
            self.total_chars as f64 / self.total_duration_sec
        }
    }
}

/// 单个任务结束时记录的数据
#[derive(Debug, Clone, Default)]
pub struct JobRecord {
    pub total_segments: u64,
    pub total_chars: u64,
    pub duration_sec: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub error_segments: u64,
}

/// 调度器指标
///
/// 浮点累计量以微秒存储
#[derive(Debug, Default)]
pub struct Metrics {
    total_jobs: AtomicU64,
    total_segments: AtomicU64,
    total_chars: AtomicU64,
    total_duration_us: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    error_segments: AtomicU64,
    segment_retries: AtomicU64,
    segment_retry_caps: AtomicU64,
    fallback_segments: AtomicU64,
    merge_lock_waits: AtomicU64,
    merge_lock_wait_us: AtomicU64,
    merge_lock_wait_max_us: AtomicU64,
    stale_queued_cancels: AtomicU64,
}

#[inline]
fn to_micros(value: f64) -> u64 {
    if value <= 0.0 {
        0
    } else {
        (value * 1_000_000.0).round() as u64
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_job(&self, record: JobRecord) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);
        self.total_segments
            .fetch_add(record.total_segments, Ordering::Relaxed);
        self.total_chars.fetch_add(record.total_chars, Ordering::Relaxed);
        self.total_duration_us
            .fetch_add(to_micros(record.duration_sec), Ordering::Relaxed);
        self.cache_hits.fetch_add(record.cache_hits, Ordering::Relaxed);
        self.cache_misses
            .fetch_add(record.cache_misses, Ordering::Relaxed);
        self.error_segments
            .fetch_add(record.error_segments, Ordering::Relaxed);
    }

    pub fn record_segment_retry(&self) {
        self.segment_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_cap(&self) {
        self.segment_retry_caps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_usage(&self) {
        self.fallback_segments.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录合并锁等待，等待时间 <= 0 时忽略
    pub fn record_merge_lock_wait(&self, wait_ms: f64) {
        if wait_ms <= 0.0 {
            return;
        }
        let micros = to_micros(wait_ms / 1000.0);
        self.merge_lock_waits.fetch_add(1, Ordering::Relaxed);
        self.merge_lock_wait_us.fetch_add(micros, Ordering::Relaxed);
        self.merge_lock_wait_max_us
            .fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_stale_queued_cancel(&self) {
        self.stale_queued_cancels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_jobs: self.total_jobs.load(Ordering::Relaxed),
            total_segments: self.total_segments.load(Ordering::Relaxed),
            total_chars: self.total_chars.load(Ordering::Relaxed),
            total_duration_sec: self.total_duration_us.load(Ordering::Relaxed) as f64
                / 1_000_000.0,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            error_segments: self.error_segments.load(Ordering::Relaxed),
            segment_retries: self.segment_retries.load(Ordering::Relaxed),
            segment_retry_caps: self.segment_retry_caps.load(Ordering::Relaxed),
            fallback_segments: self.fallback_segments.load(Ordering::Relaxed),
            merge_lock_waits: self.merge_lock_waits.load(Ordering::Relaxed),
            merge_lock_wait_ms: round3(
                self.merge_lock_wait_us.load(Ordering::Relaxed) as f64 / 1000.0,
            ),
            merge_lock_wait_max_ms: round3(
                self.merge_lock_wait_max_us.load(Ordering::Relaxed) as f64 / 1000.0,
            ),
            stale_queued_cancels: self.stale_queued_cancels.load(Ordering::Relaxed),
        }
    }
}
