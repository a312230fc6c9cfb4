//! Job Context - Value Objects

use serde::{Deserialize, Serialize};

/// 任务状态
///
/// 单调流转: queued → in_progress → {complete, complete_with_errors}，
/// canceled 只能从 queued / in_progress 进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Complete,
    CompleteWithErrors,
    Canceled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Complete => "complete",
            JobStatus::CompleteWithErrors => "complete_with_errors",
            JobStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::CompleteWithErrors | JobStatus::Canceled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 片段状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Queued,
    Synthesizing,
    Ready,
    Error,
    Canceled,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Queued => "queued",
            SegmentStatus::Synthesizing => "synthesizing",
            SegmentStatus::Ready => "ready",
            SegmentStatus::Error => "error",
            SegmentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SegmentStatus::Ready | SegmentStatus::Error | SegmentStatus::Canceled
        )
    }
}

impl std::fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 片段错误码
///
/// 合成失败与编码失败区分开，处理方式不同
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentErrorCode {
    RetryCapExceeded,
    SynthesisFailed,
    FallbackFailed,
    EncodeFailed,
    Canceled,
}

impl SegmentErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentErrorCode::RetryCapExceeded => "retry_cap_exceeded",
            SegmentErrorCode::SynthesisFailed => "synthesis_failed",
            SegmentErrorCode::FallbackFailed => "fallback_failed",
            SegmentErrorCode::EncodeFailed => "encode_failed",
            SegmentErrorCode::Canceled => "canceled",
        }
    }
}

/// 任务级错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorCode {
    /// 排队过久且无人认领，被回收
    StaleQueued,
}

/// 片段各阶段耗时（毫秒）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentTimings {
    pub resolve_ms: f64,
    pub synth_ms: f64,
    pub encode_ms: f64,
    pub total_ms: f64,
}

impl SegmentTimings {
    pub fn new(resolve_ms: f64, synth_ms: f64, encode_ms: f64, total_ms: f64) -> Self {
        Self {
            resolve_ms: round3(resolve_ms),
            synth_ms: round3(synth_ms),
            encode_ms: round3(encode_ms),
            total_ms: round3(total_ms),
        }
    }
}

/// 任务进度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: usize,
    pub ready: usize,
    pub error: usize,
    pub in_progress: usize,
    /// 完成百分比（0-100，保留三位小数）
    pub percent: f64,
}

/// 保留三位小数
#[inline]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// 截断错误信息：取第一行，最多 160 字符
pub fn short_error(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("").trim();
    first_line.chars().take(160).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::CompleteWithErrors).unwrap();
        assert_eq!(json, "\"complete_with_errors\"");
        let status: SegmentStatus = serde_json::from_str("\"synthesizing\"").unwrap();
        assert_eq!(status, SegmentStatus::Synthesizing);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(SegmentStatus::Error.is_terminal());
        assert!(!SegmentStatus::Synthesizing.is_terminal());
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(SegmentTimings::new(0.0, 1.0004, 2.0, 3.0).synth_ms, 1.0);
    }

    #[test]
    fn test_short_error() {
        assert_eq!(short_error("boom\nstack trace"), "boom");
        assert_eq!(short_error(&"x".repeat(300)).chars().count(), 160);
    }
}
