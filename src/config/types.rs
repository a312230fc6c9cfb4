//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::ports::AudioFormat;
use crate::application::scheduler::SchedulerSettings;
use crate::domain::pronunciation::ResolverSettings;
use crate::domain::ChunkConfig;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// 调度器限制与模型
    #[serde(default)]
    pub tts: TtsConfig,

    /// 合成引擎
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub dicts: DictsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub coordination: CoordinationConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 汇总为调度器设置
    pub fn scheduler_settings(&self) -> SchedulerSettings {
        let tts = &self.tts;
        let mut allowlist = tts.model_allowlist.clone();
        if allowlist.is_empty() {
            allowlist = vec![tts.model_id_default.clone(), tts.model_id_quality.clone()];
        }
        let defaults = SchedulerSettings::default();

        SchedulerSettings {
            max_text_chars: tts.max_text_chars,
            max_segments: tts.max_segments,
            max_active_jobs: tts.max_active_jobs,
            chunk: ChunkConfig {
                target_chars: tts.chunk_target_chars,
                max_chars: tts.chunk_max_chars,
                min_chars: tts.min_segment_chars,
            },
            segment_max_retries: tts.segment_max_retries,
            segment_stale_secs: tts.segment_stale_secs,
            stale_queued_secs: tts.stale_queued_secs,
            stale_queued_require_workers: tts.stale_queued_require_workers,
            stale_queued_abandoned_secs: tts.stale_queued_abandoned_secs,
            jobs_ttl: Duration::from_secs(tts.jobs_ttl_secs),
            max_workers: if tts.max_workers == 0 {
                defaults.max_workers
            } else {
                tts.max_workers
            },
            max_concurrent_segments: tts.max_concurrent_segments,
            per_job_workers: tts.per_job_workers,
            require_workers: tts.require_workers,
            default_model: tts.model_id_default.clone(),
            quality_model: tts.model_id_quality.clone(),
            model_allowlist: allowlist,
            compiler_version: tts.compiler_version.clone(),
            synth_acquire_timeout: Duration::from_secs(tts.synth_acquire_timeout_secs),
            public_segment_base_url: self.server.public_segment_base_url.clone(),
            merge_lock_wait: Duration::from_millis(tts.merge_lock_wait_ms),
            claim_ttl: Duration::from_secs(self.worker.claim_ttl_secs),
            segments_dir: self.storage.segments_dir.clone(),
        }
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            enable_autolearn: self.dicts.enable_autolearn,
            autolearn_on_miss: self.dicts.autolearn_on_miss,
            autolearn_min_len: self.dicts.autolearn_min_len,
            autolearn_flush_secs: self.dicts.autolearn_flush_secs,
        }
    }
}

// ============================================================================
// server
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// 反向代理下的片段地址前缀
    #[serde(default = "default_public_segment_base_url")]
    pub public_segment_base_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_segment_base_url() -> String {
    "/api/tts".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_segment_base_url: default_public_segment_base_url(),
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// tts
// ============================================================================

/// 调度器配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub max_text_chars: usize,
    pub max_segments: usize,
    pub max_active_jobs: usize,
    pub min_segment_chars: usize,
    pub chunk_target_chars: usize,
    pub chunk_max_chars: usize,
    pub segment_max_retries: u32,
    pub segment_stale_secs: u64,
    pub stale_queued_secs: u64,
    pub stale_queued_require_workers: bool,
    pub stale_queued_abandoned_secs: u64,
    pub jobs_ttl_secs: u64,
    /// 0 表示 min(4, CPU 数)
    pub max_workers: usize,
    pub max_concurrent_segments: usize,
    pub per_job_workers: usize,
    /// 分布式部署下没有在线 worker 时拒绝提交
    pub require_workers: bool,
    pub model_id_default: String,
    pub model_id_quality: String,
    /// 为空时只允许 default / quality 两个模型
    pub model_allowlist: Vec<String>,
    pub compiler_version: String,
    pub synth_acquire_timeout_secs: u64,
    pub merge_lock_wait_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        let defaults = SchedulerSettings::default();
        Self {
            max_text_chars: defaults.max_text_chars,
            max_segments: defaults.max_segments,
            max_active_jobs: defaults.max_active_jobs,
            min_segment_chars: defaults.chunk.min_chars,
            chunk_target_chars: defaults.chunk.target_chars,
            chunk_max_chars: defaults.chunk.max_chars,
            segment_max_retries: defaults.segment_max_retries,
            segment_stale_secs: defaults.segment_stale_secs,
            stale_queued_secs: defaults.stale_queued_secs,
            stale_queued_require_workers: defaults.stale_queued_require_workers,
            stale_queued_abandoned_secs: defaults.stale_queued_abandoned_secs,
            jobs_ttl_secs: defaults.jobs_ttl.as_secs(),
            max_workers: 0,
            max_concurrent_segments: defaults.max_concurrent_segments,
            per_job_workers: defaults.per_job_workers,
            require_workers: defaults.require_workers,
            model_id_default: defaults.default_model,
            model_id_quality: defaults.quality_model,
            model_allowlist: Vec::new(),
            compiler_version: defaults.compiler_version,
            synth_acquire_timeout_secs: defaults.synth_acquire_timeout.as_secs(),
            merge_lock_wait_ms: defaults.merge_lock_wait.as_millis() as u64,
        }
    }
}

// ============================================================================
// synthesis
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisBackend {
    /// 远程 HTTP 合成服务
    #[default]
    Http,
    /// 本地正弦波引擎（联调/测试）
    Fake,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub backend: SynthesisBackend,

    #[serde(default = "default_synthesis_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_synthesis_timeout")]
    pub timeout_secs: u64,

    /// 支持选择音色的模型（仅 fake 引擎使用）
    #[serde(default)]
    pub fake_voice_models: Vec<String>,
}

fn default_synthesis_url() -> String {
    "http://localhost:5002".to_string()
}

fn default_synthesis_timeout() -> u64 {
    120
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            backend: SynthesisBackend::default(),
            url: default_synthesis_url(),
            timeout_secs: default_synthesis_timeout(),
            fake_voice_models: Vec::new(),
        }
    }
}

// ============================================================================
// audio
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AudioConfig {
    /// wav / opus
    #[serde(default)]
    pub format: AudioFormat,

    /// Opus 比特率（bps），为空时使用编码器默认值
    #[serde(default)]
    pub opus_bitrate: Option<u32>,
}

// ============================================================================
// dicts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhonemizerBackend {
    #[default]
    Espeak,
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DictsConfig {
    pub dict_dir: PathBuf,
    pub autolearn_path: PathBuf,
    pub enable_autolearn: bool,
    pub autolearn_on_miss: bool,
    pub autolearn_min_len: usize,
    pub autolearn_flush_secs: u64,
    pub phonemizer: PhonemizerBackend,
    pub espeak_binary: String,
    pub espeak_voice: Option<String>,
}

impl Default for DictsConfig {
    fn default() -> Self {
        let resolver = ResolverSettings::default();
        Self {
            dict_dir: PathBuf::from("data/dicts"),
            autolearn_path: PathBuf::from("data/dicts/auto_learn.json"),
            enable_autolearn: resolver.enable_autolearn,
            autolearn_on_miss: resolver.autolearn_on_miss,
            autolearn_min_len: resolver.autolearn_min_len,
            autolearn_flush_secs: resolver.autolearn_flush_secs,
            phonemizer: PhonemizerBackend::default(),
            espeak_binary: "espeak-ng".to_string(),
            espeak_voice: Some("en-us".to_string()),
        }
    }
}

// ============================================================================
// storage
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 片段缓存索引（sled）
    pub cache_index_path: PathBuf,
    /// 片段音频与合并产物目录
    pub segments_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_index_path: PathBuf::from("data/cache/index.sled"),
            segments_dir: PathBuf::from("data/cache/segments"),
        }
    }
}

// ============================================================================
// coordination
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackend {
    /// 单进程
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub backend: CoordinationBackend,
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            backend: CoordinationBackend::default(),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "pronouncex:".to_string(),
        }
    }
}

// ============================================================================
// worker
// ============================================================================

/// 进程角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerRole {
    /// API + worker
    #[default]
    All,
    /// 只提交/查询
    Api,
    /// 只处理任务，不提供 HTTP
    Worker,
}

impl WorkerRole {
    pub fn serves_http(&self) -> bool {
        matches!(self, WorkerRole::All | WorkerRole::Api)
    }

    pub fn runs_worker(&self) -> bool {
        matches!(self, WorkerRole::All | WorkerRole::Worker)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub role: WorkerRole,
    /// 为空时随机生成
    pub worker_id: Option<String>,
    pub heartbeat_ttl_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub claim_ttl_secs: u64,
    pub claim_refresh_secs: u64,
    pub sweep_interval_secs: u64,
    pub dequeue_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            role: WorkerRole::default(),
            worker_id: None,
            heartbeat_ttl_secs: 10,
            heartbeat_interval_secs: 2,
            claim_ttl_secs: 60,
            claim_refresh_secs: 20,
            sweep_interval_secs: 10,
            dequeue_timeout_secs: 5,
        }
    }
}

// ============================================================================
// log
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别，RUST_LOG 优先
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8000");
        assert_eq!(config.tts.max_text_chars, 20_000);
        assert_eq!(config.tts.max_segments, 120);
        assert_eq!(config.tts.chunk_target_chars, 300);
        assert_eq!(config.tts.chunk_max_chars, 500);
        assert_eq!(config.tts.min_segment_chars, 60);
        assert_eq!(config.coordination.backend, CoordinationBackend::Memory);
        assert_eq!(config.worker.role, WorkerRole::All);
    }

    #[test]
    fn test_scheduler_settings_fill_allowlist() {
        let mut config = AppConfig::default();
        config.tts.model_id_default = "fast".to_string();
        config.tts.model_id_quality = "slow".to_string();
        config.tts.max_workers = 3;

        let settings = config.scheduler_settings();
        assert_eq!(settings.model_allowlist, vec!["fast", "slow"]);
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.chunk.min_chars, 60);
        assert_eq!(settings.public_segment_base_url, "/api/tts");
    }

    #[test]
    fn test_roles() {
        assert!(WorkerRole::All.serves_http() && WorkerRole::All.runs_worker());
        assert!(!WorkerRole::Api.runs_worker());
        assert!(!WorkerRole::Worker.serves_http());
    }
}
