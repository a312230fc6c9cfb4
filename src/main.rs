//! PronounceX - 长文本 TTS 任务服务
//!
//! 按角色启动：all（API + worker）、api、worker

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use pronouncex::application::{
    AudioEncoderPort, CoordinationPort, JobManager, MergeLockPort, Metrics, SchedulerDeps,
    SegmentCachePort, SynthesizerFactory,
};
use pronouncex::config::{
    load_config, print_config, AppConfig, CoordinationBackend, PhonemizerBackend,
    SynthesisBackend,
};
use pronouncex::domain::job::new_hex_id;
use pronouncex::domain::pronunciation::{Phonemizer, PronunciationResolver};
use pronouncex::infrastructure::adapters::{
    CoordinationMergeLock, EspeakPhonemizer, FakeSynthesizerConfig, FakeSynthesizerFactory,
    FileMergeLock, HttpSynthesizerConfig, HttpSynthesizerFactory, SegmentEncoder,
};
use pronouncex::infrastructure::http::{AppState, HttpServer};
use pronouncex::infrastructure::worker::{
    spawn_heartbeat, spawn_orphan_sweeper, HeartbeatConfig, JobWorker, JobWorkerConfig,
};
use pronouncex::infrastructure::{
    FileDictStore, InMemoryCoordination, RedisCoordination, RedisCoordinationConfig,
    SharedSegmentCache, SledCacheConfig, SledSegmentCache,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("PronounceX - TTS job service");
    print_config(&config);

    tokio::fs::create_dir_all(&config.storage.segments_dir).await?;
    if let Some(parent) = config.storage.cache_index_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let coordination = build_coordination(&config).await?;

    // sled 独占文件锁，多进程部署时缓存索引放在协调后端
    let cache: Arc<dyn SegmentCachePort> = match config.coordination.backend {
        CoordinationBackend::Memory => {
            let cache_config = SledCacheConfig {
                db_path: config.storage.cache_index_path.display().to_string(),
                segments_dir: config.storage.segments_dir.clone(),
                format: config.audio.format,
            };
            Arc::new(SledSegmentCache::new(&cache_config)?)
        }
        CoordinationBackend::Redis => Arc::new(SharedSegmentCache::new(
            coordination.clone(),
            config.storage.segments_dir.clone(),
            config.audio.format,
        )?),
    };

    let resolver = Arc::new(build_resolver(&config)?);
    let synthesizers = build_synthesizers(&config)?;
    let encoder: Arc<dyn AudioEncoderPort> =
        Arc::new(SegmentEncoder::new(config.audio.format, config.audio.opus_bitrate));

    // 多进程部署时合并锁必须跨进程可见
    let merge_lock: Arc<dyn MergeLockPort> = match config.coordination.backend {
        CoordinationBackend::Memory => Arc::new(FileMergeLock::new(&config.storage.segments_dir)),
        CoordinationBackend::Redis => Arc::new(CoordinationMergeLock::new(
            coordination.clone(),
            Duration::from_secs(config.worker.claim_ttl_secs),
        )),
    };

    let manager = Arc::new(JobManager::new(
        config.scheduler_settings(),
        SchedulerDeps {
            coordination: coordination.clone(),
            cache,
            resolver: resolver.clone(),
            synthesizers,
            encoder,
            merge_lock,
            metrics: Arc::new(Metrics::new()),
        },
    ));

    let role = config.worker.role;
    let server = if role.serves_http() {
        let addr = config.server.addr();
        let server = HttpServer::bind(&addr, AppState::new(manager.clone()))
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        Some(server)
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let mut background = Vec::new();

    if role.runs_worker() {
        let worker_id = config.worker.worker_id.clone().unwrap_or_else(new_hex_id);
        let heartbeat = HeartbeatConfig {
            ttl: Duration::from_secs(config.worker.heartbeat_ttl_secs),
            interval: Duration::from_secs(config.worker.heartbeat_interval_secs),
            sweep_interval: Duration::from_secs(config.worker.sweep_interval_secs),
        };
        background.push(spawn_heartbeat(
            coordination.clone(),
            worker_id.clone(),
            heartbeat.clone(),
            shutdown.clone(),
        ));
        background.push(spawn_orphan_sweeper(
            manager.clone(),
            heartbeat,
            shutdown.clone(),
        ));

        let worker_config = JobWorkerConfig {
            worker_id,
            max_concurrent: config.scheduler_settings().max_workers.max(1),
            dequeue_timeout: Duration::from_secs(config.worker.dequeue_timeout_secs),
            claim_ttl: Duration::from_secs(config.worker.claim_ttl_secs),
            claim_refresh: Duration::from_secs(config.worker.claim_refresh_secs),
        };
        let worker = JobWorker::new(worker_config, manager.clone(), shutdown.clone());
        background.push(tokio::spawn(worker.run()));
    }

    match server {
        Some(server) => {
            let token = shutdown.clone();
            tokio::spawn(async move {
                wait_for_signal().await;
                token.cancel();
            });
            server.serve(shutdown.clone()).await?;
        }
        None => wait_for_signal().await,
    }

    shutdown.cancel();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }

    if let Err(e) = resolver.flush() {
        tracing::warn!(error = %e, "Failed to flush auto-learned pronunciations");
    }

    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},pronouncex={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for ctrl-c");
    }
    tracing::info!("Received shutdown signal");
}

async fn build_coordination(config: &AppConfig) -> anyhow::Result<Arc<dyn CoordinationPort>> {
    match config.coordination.backend {
        CoordinationBackend::Memory => Ok(Arc::new(InMemoryCoordination::new())),
        CoordinationBackend::Redis => {
            let redis_config = RedisCoordinationConfig {
                url: config.coordination.redis_url.clone(),
                key_prefix: config.coordination.key_prefix.clone(),
            };
            let coordination = RedisCoordination::connect(&redis_config)
                .await
                .context("Failed to connect to redis")?;
            Ok(Arc::new(coordination))
        }
    }
}

fn build_resolver(config: &AppConfig) -> anyhow::Result<PronunciationResolver> {
    let store = Arc::new(FileDictStore::new(
        &config.dicts.dict_dir,
        &config.dicts.autolearn_path,
    ));

    let phonemizer: Option<Arc<dyn Phonemizer>> = match config.dicts.phonemizer {
        PhonemizerBackend::None => None,
        PhonemizerBackend::Espeak => {
            let espeak = EspeakPhonemizer::new(
                config.dicts.espeak_binary.clone(),
                config.dicts.espeak_voice.clone(),
            );
            if espeak.is_available() {
                Some(Arc::new(espeak))
            } else {
                tracing::warn!(
                    binary = %config.dicts.espeak_binary,
                    "espeak-ng not available, phonemizer disabled"
                );
                None
            }
        }
    };

    PronunciationResolver::new(config.resolver_settings(), store, phonemizer)
        .context("Failed to load dictionaries")
}

fn build_synthesizers(config: &AppConfig) -> anyhow::Result<Arc<dyn SynthesizerFactory>> {
    match config.synthesis.backend {
        SynthesisBackend::Http => {
            let http_config = HttpSynthesizerConfig::new(config.synthesis.url.clone())
                .with_timeout(config.synthesis.timeout_secs);
            Ok(Arc::new(HttpSynthesizerFactory::new(http_config)?))
        }
        SynthesisBackend::Fake => {
            let fake_config = FakeSynthesizerConfig {
                voice_models: config.synthesis.fake_voice_models.iter().cloned().collect(),
                max_input_chars: HashMap::new(),
                ..Default::default()
            };
            Ok(Arc::new(FakeSynthesizerFactory::new(fake_config)))
        }
    }
}
