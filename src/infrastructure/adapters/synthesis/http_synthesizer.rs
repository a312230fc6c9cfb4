//! HTTP Synthesizer - 调用外部合成引擎服务
//!
//! 外部引擎 API:
//! GET  {base_url}/api/tts/models/{model_id}
//!      Response: {"model_id": "...", "supports_voice": bool}
//! POST {base_url}/api/tts/synthesize
//!      Request: {"model_id", "text", "phonemes", "voice_id"}  (JSON)
//!      Response: audio/wav binary (16-bit PCM), 元数据在 headers
//!      失败时 body 为错误文本；X-Error-Kind: capacity 表示输入超出模型容量

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::application::ports::{SynthesisError, SynthesisOutput, Synthesizer, SynthesizerFactory};

/// 合成请求体 (JSON)
#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    model_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phonemes: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    supports_voice: bool,
}

/// HTTP 合成客户端配置
#[derive(Debug, Clone)]
pub struct HttpSynthesizerConfig {
    /// 引擎服务基础 URL
    pub base_url: String,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl Default for HttpSynthesizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 120,
        }
    }
}

impl HttpSynthesizerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// HTTP 合成引擎工厂
///
/// 所有实例共享同一个 reqwest Client
pub struct HttpSynthesizerFactory {
    client: Client,
    config: Arc<HttpSynthesizerConfig>,
}

impl HttpSynthesizerFactory {
    pub fn new(config: HttpSynthesizerConfig) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthesisError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }
}

#[async_trait]
impl SynthesizerFactory for HttpSynthesizerFactory {
    async fn create(&self, model_id: &str) -> Result<Box<dyn Synthesizer>, SynthesisError> {
        let synth = HttpSynthesizer {
            client: self.client.clone(),
            config: self.config.clone(),
            model_id: model_id.to_string(),
        };
        // 预加载模型，模型不存在时直接失败
        synth.model_info().await?;
        tracing::info!(model_id = %model_id, "Synthesizer model loaded");
        Ok(Box::new(synth))
    }
}

/// 绑定到单个模型的 HTTP 合成引擎
pub struct HttpSynthesizer {
    client: Client,
    config: Arc<HttpSynthesizerConfig>,
    model_id: String,
}

impl HttpSynthesizer {
    fn synthesize_url(&self) -> String {
        format!("{}/api/tts/synthesize", self.config.base_url)
    }

    fn model_url(&self) -> String {
        format!("{}/api/tts/models/{}", self.config.base_url, self.model_id)
    }

    async fn model_info(&self) -> Result<ModelInfo, SynthesisError> {
        let response = self
            .client
            .get(self.model_url())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(SynthesisError::ModelUnavailable(self.model_id.clone())),
            status if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                Err(SynthesisError::EngineError(format!("HTTP {}: {}", status, text)))
            }
            _ => response
                .json::<ModelInfo>()
                .await
                .map_err(|e| SynthesisError::InvalidResponse(e.to_string())),
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> SynthesisError {
    if e.is_timeout() {
        SynthesisError::Timeout
    } else if e.is_connect() {
        SynthesisError::NetworkError(format!("Cannot connect to synthesis service: {}", e))
    } else {
        SynthesisError::NetworkError(e.to_string())
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn supports_voice_selection(&self) -> Result<bool, SynthesisError> {
        Ok(self.model_info().await?.supports_voice)
    }

    async fn synthesize(
        &self,
        text: &str,
        phonemes: Option<&str>,
        voice_id: Option<&str>,
    ) -> Result<SynthesisOutput, SynthesisError> {
        let request = SynthesizeRequest {
            model_id: &self.model_id,
            text,
            phonemes,
            voice_id,
        };

        tracing::debug!(
            url = %self.synthesize_url(),
            model_id = %self.model_id,
            text_len = text.len(),
            with_phonemes = phonemes.is_some(),
            "Sending synthesize request"
        );

        let response = self
            .client
            .post(self.synthesize_url())
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let capacity = response
                .headers()
                .get("X-Error-Kind")
                .and_then(|v| v.to_str().ok())
                .map_or(false, |v| v.eq_ignore_ascii_case("capacity"));
            let error_text = response.text().await.unwrap_or_default();
            return Err(if capacity {
                SynthesisError::CapacityExceeded(error_text)
            } else {
                SynthesisError::EngineError(format!("HTTP {}: {}", status, error_text))
            });
        }

        let used_phonemes = response
            .headers()
            .get("X-Used-Phonemes")
            .and_then(|v| v.to_str().ok())
            .map_or(phonemes.is_some(), |v| v == "1" || v.eq_ignore_ascii_case("true"));

        let body = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::InvalidResponse(format!("Failed to read audio: {}", e)))?;
        let (samples, sample_rate) = decode_pcm16_wav(&body)?;

        tracing::debug!(
            model_id = %self.model_id,
            samples = samples.len(),
            sample_rate,
            "Synthesis completed"
        );

        Ok(SynthesisOutput {
            samples,
            sample_rate,
            used_phonemes,
        })
    }
}

/// 解析 16-bit PCM WAV，多声道取平均
fn decode_pcm16_wav(data: &[u8]) -> Result<(Vec<f32>, u32), SynthesisError> {
    let invalid = |msg: &str| SynthesisError::InvalidResponse(msg.to_string());
    if data.len() < 44 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(invalid("Invalid WAV: missing RIFF/WAVE header"));
    }

    let mut pos = 12;
    let mut format: Option<(u16, u32, u16)> = None;
    while pos + 8 <= data.len() {
        let chunk_id = &data[pos..pos + 4];
        let size = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        let body_start = pos + 8;
        let body_end = (body_start + size).min(data.len());

        match chunk_id {
            b"fmt " if size >= 16 && body_end - body_start >= 16 => {
                let fmt = &data[body_start..body_end];
                let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
                let rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
                let bits = u16::from_le_bytes([fmt[14], fmt[15]]);
                format = Some((channels, rate, bits));
            }
            b"data" => {
                let (channels, rate, bits) =
                    format.ok_or_else(|| invalid("Invalid WAV: data before fmt chunk"))?;
                if bits != 16 || channels == 0 {
                    return Err(invalid("Unsupported WAV: expected 16-bit PCM"));
                }
                let channels = channels as usize;
                let samples = data[body_start..body_end]
                    .chunks_exact(2 * channels)
                    .map(|frame| {
                        frame
                            .chunks_exact(2)
                            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
                            .sum::<f32>()
                            / channels as f32
                    })
                    .collect();
                return Ok((samples, rate));
            }
            _ => {}
        }

        pos = body_start + size + (size % 2);
    }

    Err(invalid("Invalid WAV: missing data chunk"))
}
