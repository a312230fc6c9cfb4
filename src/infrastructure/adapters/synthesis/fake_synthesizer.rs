//! Fake Synthesizer - 用于测试和本地开发的合成引擎
//!
//! 不加载任何模型，按文本长度生成确定性的正弦音

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisOutput, Synthesizer, SynthesizerFactory};

/// Fake 引擎配置
#[derive(Debug, Clone)]
pub struct FakeSynthesizerConfig {
    /// 输出采样率
    pub sample_rate: u32,
    /// 每个字符对应的音频时长（毫秒）
    pub ms_per_char: u64,
    /// 模拟推理延迟
    pub latency: Duration,
    /// 支持音色选择的模型
    pub voice_models: HashSet<String>,
    /// 模型 → 最大输入字符数，超出时返回容量错误
    pub max_input_chars: HashMap<String, usize>,
}

impl Default for FakeSynthesizerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            ms_per_char: 60,
            latency: Duration::from_millis(20),
            voice_models: HashSet::new(),
            max_input_chars: HashMap::new(),
        }
    }
}

/// Fake 引擎工厂
pub struct FakeSynthesizerFactory {
    config: FakeSynthesizerConfig,
}

impl FakeSynthesizerFactory {
    pub fn new(config: FakeSynthesizerConfig) -> Self {
        tracing::info!(
            sample_rate = config.sample_rate,
            "FakeSynthesizerFactory initialized"
        );
        Self { config }
    }
}

#[async_trait]
impl SynthesizerFactory for FakeSynthesizerFactory {
    async fn create(&self, model_id: &str) -> Result<Box<dyn Synthesizer>, SynthesisError> {
        Ok(Box::new(FakeSynthesizer {
            model_id: model_id.to_string(),
            config: self.config.clone(),
        }))
    }
}

/// Fake 引擎实例
pub struct FakeSynthesizer {
    model_id: String,
    config: FakeSynthesizerConfig,
}

impl FakeSynthesizer {
    fn tone(&self, chars: usize, pitch: f32) -> Vec<f32> {
        let ms = (chars as u64).max(1) * self.config.ms_per_char;
        let n = (self.config.sample_rate as u64 * ms / 1000) as usize;
        let step = pitch * 2.0 * std::f32::consts::PI / self.config.sample_rate as f32;
        (0..n).map(|i| (i as f32 * step).sin() * 0.2).collect()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn supports_voice_selection(&self) -> Result<bool, SynthesisError> {
        Ok(self.config.voice_models.contains(&self.model_id))
    }

    async fn synthesize(
        &self,
        text: &str,
        phonemes: Option<&str>,
        voice_id: Option<&str>,
    ) -> Result<SynthesisOutput, SynthesisError> {
        let input = phonemes.unwrap_or(text);
        let chars = input.chars().count();

        if let Some(&limit) = self.config.max_input_chars.get(&self.model_id) {
            if chars > limit {
                return Err(SynthesisError::EngineError(
                    "RuntimeError: Kernel size can't be greater than actual input size".to_string(),
                ));
            }
        }

        tracing::debug!(
            model_id = %self.model_id,
            voice_id = ?voice_id,
            text_len = chars,
            "FakeSynthesizer: generating tone"
        );
        tokio::time::sleep(self.config.latency).await;

        // 不同音色用不同音高，便于区分
        let pitch = 220.0 + voice_id.map_or(0, |v| v.len() % 8) as f32 * 20.0;
        Ok(SynthesisOutput {
            samples: self.tone(chars, pitch),
            sample_rate: self.config.sample_rate,
            used_phonemes: phonemes.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tone_length_follows_text() {
        let factory = FakeSynthesizerFactory::new(FakeSynthesizerConfig {
            latency: Duration::ZERO,
            ..Default::default()
        });
        let synth = factory.create("m").await.unwrap();
        let short = synth.synthesize("hi", None, None).await.unwrap();
        let long = synth.synthesize("hello there", None, None).await.unwrap();
        assert!(long.samples.len() > short.samples.len());
        assert!(!short.used_phonemes);
        assert!(!synth.supports_voice_selection().await.unwrap());
    }

    #[tokio::test]
    async fn test_capacity_limit_reports_signature() {
        let mut config = FakeSynthesizerConfig {
            latency: Duration::ZERO,
            ..Default::default()
        };
        config.max_input_chars.insert("small".to_string(), 4);
        let factory = FakeSynthesizerFactory::new(config);

        let synth = factory.create("small").await.unwrap();
        let err = synth.synthesize("too long for it", None, None).await.unwrap_err();
        assert!(err.is_capacity_exhausted());

        let big = factory.create("big").await.unwrap();
        assert!(big.synthesize("too long for it", None, None).await.is_ok());
    }
}
