//! Audio Handlers - 片段音频与合并音频

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::application::scheduler::MergeOutcome;
use crate::application::{GetJob, GetMergedAudio, GetSegmentAudio, SegmentAudio};
use crate::infrastructure::http::dto::{ApiResponse, NotReadyResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 片段按 cache key 寻址，内容不可变
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";

fn accepted(body: NotReadyResponse) -> Response {
    let mut response = (StatusCode::ACCEPTED, Json(ApiResponse::success(body))).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
    response
}

async fn file_response(
    path: &FsPath,
    content_type: &str,
    extra_headers: Vec<(header::HeaderName, String)>,
) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ApiError::NotFound(format!("audio file unavailable: {}", e)))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .len();

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, len)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    for (name, value) in extra_headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub async fn get_segment_audio(
    State(state): State<Arc<AppState>>,
    Path((job_id, segment_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let query = GetSegmentAudio {
        job_id: job_id.clone(),
        segment_id: segment_id.clone(),
    };
    match state.get_segment_audio_handler.handle(query).await? {
        SegmentAudio::Pending { status } => {
            let view = state
                .get_job_handler
                .handle(GetJob {
                    job_id: job_id.clone(),
                })
                .await?;
            Ok(accepted(NotReadyResponse::new(
                job_id,
                status.as_str(),
                &view.progress,
            )))
        }
        SegmentAudio::Ready {
            path,
            cache_key,
            content_type,
        } => {
            file_response(
                &path,
                content_type,
                vec![
                    (header::CACHE_CONTROL, IMMUTABLE_CACHE.to_string()),
                    (header::ETAG, format!("\"{}\"", cache_key)),
                    (header::HeaderName::from_static("x-job-id"), job_id),
                ],
            )
            .await
        }
    }
}

pub async fn get_merged_audio(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state
        .get_merged_audio_handler
        .handle(GetMergedAudio {
            job_id: job_id.clone(),
        })
        .await?;

    match outcome {
        MergeOutcome::NotReady { status, progress } => {
            Ok(accepted(NotReadyResponse::new(job_id, status.as_str(), &progress)))
        }
        MergeOutcome::Ready(merged) => {
            let disposition = format!(
                "inline; filename=\"job_{}.{}\"",
                job_id,
                merged.format.extension()
            );
            file_response(
                &merged.path,
                merged.format.mime_type(),
                vec![
                    (header::CONTENT_DISPOSITION, disposition),
                    (header::ETAG, format!("\"{}\"", merged.fingerprint)),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
            )
            .await
        }
    }
}
