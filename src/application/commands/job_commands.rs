//! Job Commands - 任务相关命令

use serde_json::Value;

use crate::application::scheduler::JobRequest;

/// 提交任务命令
#[derive(Debug, Clone)]
pub struct SubmitJob {
    pub text: String,
    /// 模型别名（default / quality），优先于 model_id
    pub model: Option<String>,
    pub model_id: Option<String>,
    pub voice_id: Option<String>,
    pub reading_profile: Option<Value>,
    pub prefer_phonemes: bool,
}

impl SubmitJob {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            model_id: None,
            voice_id: None,
            reading_profile: None,
            prefer_phonemes: true,
        }
    }

    pub(crate) fn into_request(self) -> JobRequest {
        let model_id = self
            .model
            .filter(|m| !m.trim().is_empty())
            .or(self.model_id);
        JobRequest {
            text: self.text,
            model_id,
            voice_id: self.voice_id,
            reading_profile: self.reading_profile,
            prefer_phonemes: self.prefer_phonemes,
        }
    }
}

/// 取消任务命令
#[derive(Debug, Clone)]
pub struct CancelJob {
    pub job_id: String,
}
