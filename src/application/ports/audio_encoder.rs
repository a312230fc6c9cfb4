//! Audio Encoder Port - 音频编码抽象
//!
//! 原始采样 → 可播放文件；合并时拼接多个片段文件

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 编码错误
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for EncodeError {
    fn from(err: std::io::Error) -> Self {
        EncodeError::IoError(err.to_string())
    }
}

/// 音频输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// 16-bit PCM WAV
    #[default]
    Wav,
    /// Ogg 封装的 Opus
    Opus,
}

impl AudioFormat {
    /// 文件扩展名
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Opus => "ogg",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Opus => "audio/ogg",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioFormat::Wav => write!(f, "wav"),
            AudioFormat::Opus => write!(f, "opus"),
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wav" => Ok(AudioFormat::Wav),
            "opus" | "ogg" => Ok(AudioFormat::Opus),
            _ => Err(EncodeError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// 编码结果
#[derive(Debug, Clone)]
pub struct EncodeResult {
    pub path: PathBuf,
    pub duration_ms: u64,
    pub size_bytes: u64,
}

/// Audio Encoder Port
///
/// CPU 密集，调用方应放在 blocking 线程中执行
pub trait AudioEncoderPort: Send + Sync {
    fn format(&self) -> AudioFormat;

    /// 编码采样并写入 dest（先写临时文件再改名）
    fn encode(&self, samples: &[f32], sample_rate: u32, dest: &Path)
        -> Result<EncodeResult, EncodeError>;

    /// 按顺序拼接多个已编码文件
    fn concat(&self, sources: &[PathBuf], dest: &Path) -> Result<EncodeResult, EncodeError>;
}
