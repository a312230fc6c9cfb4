//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, CoordinationBackend, SynthesisBackend, WorkerRole};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `PRONOUNCEX_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `PRONOUNCEX_SERVER__PORT=8080`
/// - `PRONOUNCEX_TTS__MAX_ACTIVE_JOBS=50`
/// - `PRONOUNCEX_SYNTHESIS__URL=http://coqui:5002`
/// - `PRONOUNCEX_COORDINATION__BACKEND=redis`
/// - `PRONOUNCEX_WORKER__ROLE=worker`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级），其余字段走 serde 默认
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("server.public_segment_base_url", "/api/tts")?
        .set_default("synthesis.backend", "http")?
        .set_default("synthesis.url", "http://localhost:5002")?
        .set_default("synthesis.timeout_secs", 120)?
        .set_default("audio.format", "wav")?
        .set_default("coordination.backend", "memory")?
        .set_default("worker.role", "all")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 注意: 环境变量名会被转换为小写
    builder = builder.add_source(
        Environment::with_prefix("PRONOUNCEX")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("tts.model_allowlist")
            .with_list_parse_key("synthesis.fake_voice_models")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// 验证配置有效性
pub(crate) fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }

    let tts = &config.tts;
    if tts.max_text_chars == 0 || tts.max_segments == 0 || tts.max_active_jobs == 0 {
        return Err(invalid("TTS limits must be greater than 0"));
    }
    if tts.chunk_target_chars == 0 {
        return Err(invalid("Chunk target cannot be 0"));
    }
    if tts.chunk_max_chars < tts.chunk_target_chars {
        return Err(invalid(format!(
            "Chunk max ({}) must not be smaller than chunk target ({})",
            tts.chunk_max_chars, tts.chunk_target_chars
        )));
    }
    if tts.model_id_default.trim().is_empty() || tts.model_id_quality.trim().is_empty() {
        return Err(invalid("Model ids cannot be empty"));
    }
    if !tts.model_allowlist.is_empty() {
        for model in [&tts.model_id_default, &tts.model_id_quality] {
            if !tts.model_allowlist.contains(model) {
                return Err(invalid(format!("Model {} is not in the allowlist", model)));
            }
        }
    }

    if config.synthesis.backend == SynthesisBackend::Http && config.synthesis.url.is_empty() {
        return Err(invalid("Synthesis URL cannot be empty"));
    }

    if config.coordination.backend == CoordinationBackend::Redis
        && config.coordination.redis_url.is_empty()
    {
        return Err(invalid("Redis URL cannot be empty"));
    }
    // 独立 worker 进程只能通过共享后端拿到任务
    if config.worker.role != WorkerRole::All
        && config.coordination.backend == CoordinationBackend::Memory
    {
        return Err(invalid(format!(
            "Role {:?} requires the redis coordination backend",
            config.worker.role
        )));
    }

    let worker = &config.worker;
    if worker.heartbeat_interval_secs == 0 || worker.heartbeat_ttl_secs <= worker.heartbeat_interval_secs {
        return Err(invalid("Heartbeat TTL must exceed a non-zero heartbeat interval"));
    }
    if worker.claim_refresh_secs == 0 || worker.claim_ttl_secs <= worker.claim_refresh_secs {
        return Err(invalid("Claim TTL must exceed a non-zero claim refresh interval"));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Role: {:?}", config.worker.role);
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Public Segment Base URL: {}", config.server.public_segment_base_url);
    tracing::info!("Synthesis: {:?} ({})", config.synthesis.backend, config.synthesis.url);
    tracing::info!("Default Model: {}", config.tts.model_id_default);
    tracing::info!("Quality Model: {}", config.tts.model_id_quality);
    tracing::info!("Audio Format: {:?}", config.audio.format);
    tracing::info!("Coordination: {:?}", config.coordination.backend);
    tracing::info!("Dictionaries: {:?}", config.dicts.dict_dir);
    tracing::info!("Segments Directory: {:?}", config.storage.segments_dir);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_default_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_inverted_chunk_bounds() {
        let mut config = AppConfig::default();
        config.tts.chunk_target_chars = 400;
        config.tts.chunk_max_chars = 300;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_quality_outside_allowlist() {
        let mut config = AppConfig::default();
        config.tts.model_allowlist = vec![config.tts.model_id_default.clone()];
        assert!(validate_config(&config).is_err());

        config.tts.model_allowlist.push(config.tts.model_id_quality.clone());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_worker_role_requires_redis() {
        let mut config = AppConfig::default();
        config.worker.role = WorkerRole::Worker;
        assert!(validate_config(&config).is_err());

        config.coordination.backend = CoordinationBackend::Redis;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pronouncex.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[server]\nport = 9100\n\n[tts]\nmax_active_jobs = 3\n\n[synthesis]\nbackend = \"fake\"\n\n[audio]\nformat = \"opus\""
        )
        .unwrap();

        let config = load_config_from_path(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.tts.max_active_jobs, 3);
        assert_eq!(config.tts.max_segments, 120);
        assert_eq!(config.synthesis.backend, SynthesisBackend::Fake);
        assert_eq!(config.audio.format, crate::application::ports::AudioFormat::Opus);
    }
}
