//! 合成实例池
//!
//! 按 (模型, 有效音色) 分组复用引擎实例，每组实例数不超过上限。
//! 实例通过 [`PooledSynthesizer`] 借出，guard 析构时归还并唤醒等待者。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::application::ports::{SynthesisError, SynthesisOutput, Synthesizer, SynthesizerFactory};

type PoolKey = (String, Option<String>);

#[derive(Default)]
struct PoolState {
    idle: HashMap<PoolKey, Vec<Box<dyn Synthesizer>>>,
    totals: HashMap<PoolKey, usize>,
    /// 模型是否支持音色选择（只记录探测成功的结果）
    voice_support: HashMap<String, bool>,
}

impl PoolState {
    fn key_for(&self, model_id: &str, voice_id: Option<&str>) -> PoolKey {
        let voice = match self.voice_support.get(model_id) {
            Some(false) => None,
            _ => voice_id.filter(|v| !v.is_empty()).map(str::to_string),
        };
        (model_id.to_string(), voice)
    }

    fn shrink(&mut self, key: &PoolKey) {
        if let Some(total) = self.totals.get_mut(key) {
            *total = total.saturating_sub(1);
        }
    }
}

/// 合成实例池
pub struct SynthesizerPool {
    factory: Arc<dyn SynthesizerFactory>,
    max_per_key: usize,
    acquire_timeout: Duration,
    state: Arc<Mutex<PoolState>>,
    notify: Arc<Notify>,
}

impl SynthesizerPool {
    pub fn new(
        factory: Arc<dyn SynthesizerFactory>,
        max_per_key: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            max_per_key: max_per_key.max(1),
            acquire_timeout,
            state: Arc::new(Mutex::new(PoolState::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    /// 借出一个实例
    ///
    /// 有空闲实例直接复用；组内数量未达上限时新建；否则等待归还，超时返回 `PoolTimeout`
    pub async fn acquire(
        &self,
        model_id: &str,
        voice_id: Option<&str>,
    ) -> Result<PooledSynthesizer, SynthesisError> {
        let deadline = Instant::now() + self.acquire_timeout;

        let reserved = loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                let key = state.key_for(model_id, voice_id);
                if let Some(handle) = state.idle.get_mut(&key).and_then(Vec::pop) {
                    return Ok(self.wrap(handle, key));
                }
                let total = state.totals.entry(key.clone()).or_insert(0);
                if *total < self.max_per_key {
                    *total += 1;
                    break key;
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                return Err(SynthesisError::PoolTimeout(format!(
                    "no synthesizer for {} within {:?}",
                    model_id, self.acquire_timeout
                )));
            }
        };

        let handle = match self.factory.create(model_id).await {
            Ok(handle) => handle,
            Err(e) => {
                self.state.lock().shrink(&reserved);
                self.notify.notify_waiters();
                return Err(e);
            }
        };

        let supports_voice = match handle.supports_voice_selection().await {
            Ok(supported) => {
                self.state
                    .lock()
                    .voice_support
                    .insert(model_id.to_string(), supported);
                supported
            }
            Err(e) => {
                tracing::warn!(
                    model_id = %model_id,
                    error = %e,
                    "Voice selection probe failed, using default voice"
                );
                false
            }
        };

        let key = if supports_voice || reserved.1.is_none() {
            reserved
        } else {
            let normalized: PoolKey = (model_id.to_string(), None);
            let mut state = self.state.lock();
            state.shrink(&reserved);
            *state.totals.entry(normalized.clone()).or_insert(0) += 1;
            drop(state);
            self.notify.notify_waiters();
            normalized
        };

        tracing::debug!(model_id = %model_id, voice_id = ?key.1, "Synthesizer created");
        Ok(self.wrap(handle, key))
    }

    /// 解析请求音色在该模型上的有效值
    pub async fn effective_voice(
        &self,
        model_id: &str,
        voice_id: Option<&str>,
    ) -> Result<Option<String>, SynthesisError> {
        if voice_id.map_or(true, str::is_empty) {
            return Ok(None);
        }
        let pooled = self.acquire(model_id, voice_id).await?;
        Ok(pooled.effective_voice_id().map(str::to_string))
    }

    /// 当前各组实例总数
    pub fn instance_count(&self) -> usize {
        self.state.lock().totals.values().sum()
    }

    fn wrap(&self, handle: Box<dyn Synthesizer>, key: PoolKey) -> PooledSynthesizer {
        PooledSynthesizer {
            handle: Some(handle),
            key,
            state: self.state.clone(),
            notify: self.notify.clone(),
        }
    }
}

/// 借出的合成实例，析构时归还
pub struct PooledSynthesizer {
    handle: Option<Box<dyn Synthesizer>>,
    key: PoolKey,
    state: Arc<Mutex<PoolState>>,
    notify: Arc<Notify>,
}

impl PooledSynthesizer {
    pub fn model_id(&self) -> &str {
        &self.key.0
    }

    pub fn effective_voice_id(&self) -> Option<&str> {
        self.key.1.as_deref()
    }

    /// 使用有效音色合成
    pub async fn synthesize(
        &self,
        text: &str,
        phonemes: Option<&str>,
    ) -> Result<SynthesisOutput, SynthesisError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| SynthesisError::ModelUnavailable(self.key.0.clone()))?;
        handle
            .synthesize(text, phonemes, self.key.1.as_deref())
            .await
    }
}

impl Drop for PooledSynthesizer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.state
                .lock()
                .idle
                .entry(self.key.clone())
                .or_default()
                .push(handle);
            self.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ProbeSynth {
        model: String,
        voices: bool,
    }

    #[async_trait]
    impl Synthesizer for ProbeSynth {
        fn model_id(&self) -> &str {
            &self.model
        }

        async fn supports_voice_selection(&self) -> Result<bool, SynthesisError> {
            Ok(self.voices)
        }

        async fn synthesize(
            &self,
            _text: &str,
            _phonemes: Option<&str>,
            _voice_id: Option<&str>,
        ) -> Result<SynthesisOutput, SynthesisError> {
            Ok(SynthesisOutput {
                samples: vec![0.0; 8],
                sample_rate: 8000,
                used_phonemes: false,
            })
        }
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    #[async_trait]
    impl SynthesizerFactory for CountingFactory {
        async fn create(&self, model_id: &str) -> Result<Box<dyn Synthesizer>, SynthesisError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ProbeSynth {
                model: model_id.to_string(),
                voices: model_id == "multi",
            }))
        }
    }

    fn pool(factory: Arc<CountingFactory>, cap: usize, timeout_ms: u64) -> SynthesizerPool {
        SynthesizerPool::new(factory, cap, Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn test_released_instances_are_reused() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory.clone(), 2, 100);

        let first = pool.acquire("single", None).await.unwrap();
        drop(first);
        let _second = pool.acquire("single", None).await.unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_at_cap() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory, 1, 50);

        let _held = pool.acquire("single", None).await.unwrap();
        let err = pool.acquire("single", None).await.err().unwrap();
        assert!(matches!(err, SynthesisError::PoolTimeout(_)));
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let factory = Arc::new(CountingFactory::default());
        let pool = Arc::new(pool(factory.clone(), 1, 2000));

        let held = pool.acquire("single", None).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire("single", None).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_voice_is_dropped_for_single_voice_models() {
        let factory = Arc::new(CountingFactory::default());
        let pool = pool(factory.clone(), 2, 100);

        assert_eq!(pool.effective_voice("single", Some("p225")).await.unwrap(), None);
        assert_eq!(
            pool.effective_voice("multi", Some("p225")).await.unwrap(),
            Some("p225".to_string())
        );

        // 已知不支持音色后，不同音色请求共用同一组实例
        let _a = pool.acquire("single", Some("p226")).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.instance_count(), 2);
    }
}
