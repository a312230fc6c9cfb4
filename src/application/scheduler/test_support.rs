//! 调度器测试夹具：脚本化引擎、记录调用的编码器、内存协调后端

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use super::{JobManager, SchedulerDeps, SchedulerSettings};
use crate::application::metrics::Metrics;
use crate::application::ports::{
    AudioEncoderPort, AudioFormat, CoordinationError, CoordinationPort, EncodeError, EncodeResult,
    SynthesisError, SynthesisOutput, Synthesizer, SynthesizerFactory, UpdateFn,
};
use crate::domain::pronunciation::{PronunciationResolver, ResolverSettings};
use crate::infrastructure::adapters::CoordinationMergeLock;
use crate::infrastructure::memory::InMemoryCoordination;
use crate::infrastructure::persistence::{FileDictStore, SledCacheConfig, SledSegmentCache};

/// 引擎对某个模型的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Ok,
    /// 以文本形式报告容量耗尽
    Capacity,
    Fail,
}

#[derive(Default)]
pub(crate) struct ScriptedFactory {
    pub behaviors: HashMap<String, Behavior>,
    pub voice_models: HashSet<String>,
    pub delay: Duration,
    pub synth_calls: Arc<AtomicUsize>,
    pub created: Arc<AtomicUsize>,
}

#[async_trait]
impl SynthesizerFactory for ScriptedFactory {
    async fn create(&self, model_id: &str) -> Result<Box<dyn Synthesizer>, SynthesisError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSynth {
            model: model_id.to_string(),
            behavior: self.behaviors.get(model_id).copied().unwrap_or(Behavior::Ok),
            voices: self.voice_models.contains(model_id),
            delay: self.delay,
            calls: self.synth_calls.clone(),
        }))
    }
}

struct ScriptedSynth {
    model: String,
    behavior: Behavior,
    voices: bool,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Synthesizer for ScriptedSynth {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn supports_voice_selection(&self) -> Result<bool, SynthesisError> {
        Ok(self.voices)
    }

    async fn synthesize(
        &self,
        _text: &str,
        phonemes: Option<&str>,
        _voice_id: Option<&str>,
    ) -> Result<SynthesisOutput, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.behavior {
            Behavior::Ok => Ok(SynthesisOutput {
                samples: vec![0.1; 160],
                sample_rate: 16000,
                used_phonemes: phonemes.is_some(),
            }),
            Behavior::Capacity => Err(SynthesisError::EngineError(
                "RuntimeError: Kernel size can't be greater than actual input size".to_string(),
            )),
            Behavior::Fail => Err(SynthesisError::EngineError("CUDA out of memory".to_string())),
        }
    }
}

/// 直接写字节的编码器，记录拼接次数
#[derive(Default)]
pub(crate) struct RecordingEncoder {
    pub concat_calls: Arc<AtomicUsize>,
}

impl AudioEncoderPort for RecordingEncoder {
    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    fn encode(
        &self,
        samples: &[f32],
        _sample_rate: u32,
        dest: &Path,
    ) -> Result<EncodeResult, EncodeError> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, vec![1u8; samples.len()])?;
        Ok(EncodeResult {
            path: dest.to_path_buf(),
            duration_ms: 10,
            size_bytes: samples.len() as u64,
        })
    }

    fn concat(&self, sources: &[PathBuf], dest: &Path) -> Result<EncodeResult, EncodeError> {
        self.concat_calls.fetch_add(1, Ordering::SeqCst);
        let mut merged = Vec::new();
        for source in sources {
            merged.extend(std::fs::read(source)?);
        }
        std::fs::write(dest, &merged)?;
        Ok(EncodeResult {
            path: dest.to_path_buf(),
            duration_ms: 10 * sources.len() as u64,
            size_bytes: merged.len() as u64,
        })
    }
}

pub(crate) struct Harness {
    pub manager: Arc<JobManager>,
    pub coordination: Arc<dyn CoordinationPort>,
    pub synth_calls: Arc<AtomicUsize>,
    pub created: Arc<AtomicUsize>,
    pub concat_calls: Arc<AtomicUsize>,
    pub dir: TempDir,
}

/// 测试用设置：小分块、模型名简短
pub(crate) fn test_settings(dir: &Path) -> SchedulerSettings {
    let mut settings = SchedulerSettings::default();
    settings.default_model = "fast".to_string();
    settings.quality_model = "quality".to_string();
    settings.model_allowlist = vec!["fast".to_string(), "quality".to_string()];
    settings.chunk.target_chars = 40;
    settings.chunk.max_chars = 60;
    settings.chunk.min_chars = 5;
    settings.max_workers = 2;
    settings.synth_acquire_timeout = Duration::from_secs(2);
    settings.merge_lock_wait = Duration::from_millis(200);
    settings.segments_dir = dir.join("jobs");
    settings
}

pub(crate) fn harness(
    configure: impl FnOnce(&mut SchedulerSettings, &mut ScriptedFactory),
) -> Harness {
    harness_on(Arc::new(InMemoryCoordination::new()), configure)
}

/// 使用指定协调后端的夹具
pub(crate) fn harness_on(
    coordination: Arc<dyn CoordinationPort>,
    configure: impl FnOnce(&mut SchedulerSettings, &mut ScriptedFactory),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = test_settings(dir.path());
    let mut factory = ScriptedFactory::default();
    configure(&mut settings, &mut factory);

    let synth_calls = factory.synth_calls.clone();
    let created = factory.created.clone();
    let encoder = RecordingEncoder::default();
    let concat_calls = encoder.concat_calls.clone();

    let cache = SledSegmentCache::new(&SledCacheConfig {
        db_path: dir.path().join("index.sled").to_string_lossy().into_owned(),
        segments_dir: dir.path().join("segments"),
        format: AudioFormat::Wav,
    })
    .unwrap();
    let store = Arc::new(FileDictStore::new(
        dir.path().join("dicts"),
        dir.path().join("dicts/auto_learn.json"),
    ));
    let resolver = PronunciationResolver::new(
        ResolverSettings {
            enable_autolearn: false,
            ..Default::default()
        },
        store,
        None,
    )
    .unwrap();

    let deps = SchedulerDeps {
        coordination: coordination.clone(),
        cache: Arc::new(cache),
        resolver: Arc::new(resolver),
        synthesizers: Arc::new(factory),
        encoder: Arc::new(encoder),
        merge_lock: Arc::new(CoordinationMergeLock::new(
            coordination.clone(),
            Duration::from_secs(60),
        )),
        metrics: Arc::new(Metrics::new()),
    };

    Harness {
        manager: Arc::new(JobManager::new(settings, deps)),
        coordination,
        synth_calls,
        created,
        concat_calls,
        dir,
    }
}

/// 在读取计数器成员快照之后插入一次准入，模拟对账期间另一个进程的提交
pub(crate) struct AdmitDuringSnapshot {
    inner: InMemoryCoordination,
    /// (member, limit)
    pending: parking_lot::Mutex<Option<(String, usize)>>,
    pub admitted: Arc<AtomicUsize>,
}

impl AdmitDuringSnapshot {
    pub fn new(member: &str, limit: usize) -> Self {
        Self {
            inner: InMemoryCoordination::new(),
            pending: parking_lot::Mutex::new(Some((member.to_string(), limit))),
            admitted: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl CoordinationPort for AdmitDuringSnapshot {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn is_distributed(&self) -> bool {
        self.inner.is_distributed()
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError> {
        self.inner.set(key, value, ttl).await
    }

    async fn update(
        &self,
        key: &str,
        ttl: Option<Duration>,
        mutator: &mut UpdateFn<'_>,
    ) -> Result<Option<String>, CoordinationError> {
        self.inner.update(key, ttl, mutator).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError> {
        self.inner.exists(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.inner.delete(key).await
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, CoordinationError> {
        self.inner.scan_keys(prefix).await
    }

    async fn enqueue(&self, queue: &str, value: &str) -> Result<(), CoordinationError> {
        self.inner.enqueue(queue, value).await
    }

    async fn dequeue(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        self.inner.dequeue(queue, timeout).await
    }

    async fn queue_len(&self, queue: &str) -> Result<usize, CoordinationError> {
        self.inner.queue_len(queue).await
    }

    async fn try_lock(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<String>, CoordinationError> {
        self.inner.try_lock(name, ttl, wait).await
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<bool, CoordinationError> {
        self.inner.unlock(name, token).await
    }

    async fn counter_acquire(
        &self,
        counter: &str,
        member: &str,
        limit: usize,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        self.inner.counter_acquire(counter, member, limit, ttl).await
    }

    async fn counter_release(
        &self,
        counter: &str,
        member: &str,
    ) -> Result<bool, CoordinationError> {
        self.inner.counter_release(counter, member).await
    }

    async fn counter_members(&self, counter: &str) -> Result<Vec<String>, CoordinationError> {
        let snapshot = self.inner.counter_members(counter).await?;
        let pending = self.pending.lock().take();
        if let Some((member, limit)) = pending {
            let ttl = Duration::from_secs(60);
            if self.inner.counter_acquire(counter, &member, limit, ttl).await? {
                self.admitted.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(snapshot)
    }

    async fn counter_get(&self, counter: &str) -> Result<usize, CoordinationError> {
        self.inner.counter_get(counter).await
    }

    async fn heartbeat(&self, worker_id: &str, ttl: Duration) -> Result<(), CoordinationError> {
        self.inner.heartbeat(worker_id, ttl).await
    }

    async fn live_workers(&self) -> Result<usize, CoordinationError> {
        self.inner.live_workers().await
    }
}
