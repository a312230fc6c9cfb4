//! Data Transfer Objects

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::{
    JobView, LearnedPronunciation, ModelView, PackEntryWritten, PhonemizedText, SegmentUrls,
};
use crate::domain::job::{JobProgress, JobStatus};
use crate::domain::pronunciation::{PackSummary, LOCAL_OVERRIDES_PACK};

// ============================================================================
// 统一响应结构
// ============================================================================

/// 统一 API 响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub errno: i32,
    pub error: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 成功响应
    pub fn success(data: T) -> Self {
        Self {
            errno: 0,
            error: String::new(),
            data: Some(data),
        }
    }
}

// ============================================================================
// Job DTOs
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub text: String,
    #[serde(default)]
    pub model_id: Option<String>,
    /// 模型别名：default / quality
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub reading_profile: Option<Value>,
    #[serde(default = "default_true")]
    pub prefer_phonemes: bool,
}

/// 任务清单：任务字段 + 进度 + 每个片段的访问地址
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub manifest: Value,
}

impl JobResponse {
    pub fn new(view: &JobView, proxy_base: &str, prefer_proxy: bool) -> Result<Self, serde_json::Error> {
        let job = &view.job;
        let mut manifest = serde_json::to_value(job)?;

        if let Some(segments) = manifest.get_mut("segments").and_then(Value::as_array_mut) {
            for segment in segments.iter_mut() {
                let Some(fields) = segment.as_object_mut() else {
                    continue;
                };
                let Some(segment_id) = fields.get("segment_id").and_then(Value::as_str) else {
                    continue;
                };
                let urls = SegmentUrls::new(proxy_base, &job.job_id, segment_id);
                let best = urls.best(prefer_proxy).to_string();
                fields.insert("url_proxy".to_string(), Value::String(urls.proxy));
                fields.insert("url_backend".to_string(), Value::String(urls.backend));
                fields.insert("url".to_string(), Value::String(best));
            }
        }

        if let Some(fields) = manifest.as_object_mut() {
            merge_progress(fields, &view.progress);
        }

        Ok(Self {
            job_id: job.job_id.clone(),
            manifest,
        })
    }
}

fn merge_progress(fields: &mut Map<String, Value>, progress: &JobProgress) {
    fields.insert("segments_total".to_string(), progress.total.into());
    fields.insert("segments_ready".to_string(), progress.ready.into());
    fields.insert("segments_error".to_string(), progress.error.into());
    fields.insert("segments_in_progress".to_string(), progress.in_progress.into());
    fields.insert("progress_pct".to_string(), progress.percent.into());
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// 结果未就绪（HTTP 202）
#[derive(Debug, Serialize)]
pub struct NotReadyResponse {
    pub job_id: String,
    pub status: String,
    pub segments_total: usize,
    pub segments_ready: usize,
    pub segments_error: usize,
    pub segments_in_progress: usize,
    pub progress_pct: f64,
}

impl NotReadyResponse {
    pub fn new(job_id: impl Into<String>, status: impl Into<String>, progress: &JobProgress) -> Self {
        Self {
            job_id: job_id.into(),
            status: status.into(),
            segments_total: progress.total,
            segments_ready: progress.ready,
            segments_error: progress.error,
            segments_in_progress: progress.in_progress,
            progress_pct: progress.percent,
        }
    }
}

// ============================================================================
// Dictionary DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PackResponse {
    pub name: String,
    pub version: String,
    pub entries: usize,
}

impl From<PackSummary> for PackResponse {
    fn from(pack: PackSummary) -> Self {
        Self {
            name: pack.name,
            version: pack.version,
            entries: pack.entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PackListResponse {
    pub packs: Vec<PackResponse>,
}

impl PackListResponse {
    pub fn new(packs: Vec<PackSummary>) -> Self {
        Self {
            packs: packs.into_iter().map(PackResponse::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct LearnRequest {
    pub key: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub phonemes: Option<String>,
    /// phonemize / direct，缺省为音素化 key 后强制写入
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TeachRequest {
    pub key: String,
    pub phonemes: String,
}

#[derive(Debug, Serialize)]
pub struct PronunciationResponse {
    pub key: String,
    pub phonemes: String,
    pub source_pack: String,
}

impl From<LearnedPronunciation> for PronunciationResponse {
    fn from(learned: LearnedPronunciation) -> Self {
        Self {
            key: learned.key,
            phonemes: learned.phonemes,
            source_pack: learned.source_pack,
        }
    }
}

fn local_overrides() -> String {
    LOCAL_OVERRIDES_PACK.to_string()
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub key: String,
    pub phonemes: String,
    #[serde(default = "local_overrides")]
    pub pack: String,
}

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub key: String,
    #[serde(default = "local_overrides")]
    pub target_pack: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Serialize)]
pub struct PackEntryResponse {
    pub key: String,
    pub phonemes: String,
    pub source_pack: String,
    pub target_pack: String,
    pub version: String,
}

impl From<PackEntryWritten> for PackEntryResponse {
    fn from(written: PackEntryWritten) -> Self {
        Self {
            key: written.key,
            phonemes: written.phonemes,
            source_pack: written.source_pack,
            target_pack: written.target_pack,
            version: written.version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PhonemizeParams {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct PhonemizeResponse {
    pub text: String,
    pub phonemes: String,
    pub backend: String,
    pub language: &'static str,
}

impl From<PhonemizedText> for PhonemizeResponse {
    fn from(result: PhonemizedText) -> Self {
        Self {
            text: result.text,
            phonemes: result.phonemes,
            backend: result.backend,
            language: "en-us",
        }
    }
}

// ============================================================================
// Model DTOs
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelView>,
}
