//! Synthesizer Port - 语音合成引擎抽象
//!
//! 引擎视为黑盒：文本 + 可选音素 + 音色 → 原始采样 + 采样率

use async_trait::async_trait;
use thiserror::Error;

/// 容量耗尽类错误的特征信息
///
/// 只能返回文本错误的引擎靠这些特征识别，可触发一次高容量模型回退
pub const CAPACITY_ERROR_SIGNATURES: [&str; 2] = [
    "Kernel size can't be greater than actual input size",
    "Dimension out of range",
];

/// 合成错误
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// 输入超出模型容量，可回退到高容量模型
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Synthesizer pool exhausted: {0}")]
    PoolTimeout(String),
}

impl SynthesisError {
    /// 是否属于容量耗尽类错误
    pub fn is_capacity_exhausted(&self) -> bool {
        match self {
            SynthesisError::CapacityExceeded(_) => true,
            SynthesisError::EngineError(message) | SynthesisError::InvalidResponse(message) => {
                matches_capacity_signature(message)
            }
            _ => false,
        }
    }
}

/// 按特征信息识别容量耗尽错误
pub fn matches_capacity_signature(message: &str) -> bool {
    !message.is_empty() && CAPACITY_ERROR_SIGNATURES.iter().any(|s| message.contains(s))
}

/// 合成输出
#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    /// 单声道 f32 采样，范围 [-1, 1]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// 是否实际使用了音素输入
    pub used_phonemes: bool,
}

/// 合成引擎实例
///
/// 不保证并发安全，调用方负责串行化
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn model_id(&self) -> &str;

    /// 探测模型是否支持音色选择
    async fn supports_voice_selection(&self) -> Result<bool, SynthesisError>;

    /// 合成一段文本
    ///
    /// phonemes 为 Some 且模型支持音素输入时使用音素
    async fn synthesize(
        &self,
        text: &str,
        phonemes: Option<&str>,
        voice_id: Option<&str>,
    ) -> Result<SynthesisOutput, SynthesisError>;
}

/// 合成引擎工厂
#[async_trait]
pub trait SynthesizerFactory: Send + Sync {
    /// 创建（加载）一个模型实例
    async fn create(&self, model_id: &str) -> Result<Box<dyn Synthesizer>, SynthesisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_classification() {
        assert!(SynthesisError::CapacityExceeded("x".into()).is_capacity_exhausted());
        assert!(SynthesisError::EngineError(
            "RuntimeError: Kernel size can't be greater than actual input size".into()
        )
        .is_capacity_exhausted());
        assert!(SynthesisError::EngineError("IndexError: Dimension out of range (expected".into())
            .is_capacity_exhausted());
        assert!(!SynthesisError::EngineError("CUDA out of memory".into()).is_capacity_exhausted());
        assert!(!SynthesisError::Timeout.is_capacity_exhausted());
    }
}
