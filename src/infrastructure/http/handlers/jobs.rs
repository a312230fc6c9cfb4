//! Job Handlers

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;

use crate::application::{CancelJob, GetJob, GetPlaylist, JobView, Playlist, SubmitJob};
use crate::infrastructure::http::dto::{
    ApiResponse, CancelJobResponse, JobResponse, SubmitJobRequest,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

/// 请求经由反向代理转发时优先返回代理地址
pub fn prefer_proxy(headers: &HeaderMap) -> bool {
    headers.contains_key("x-forwarded-host") || headers.contains_key("x-forwarded-proto")
}

pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SubmitJobRequest>,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let command = SubmitJob {
        text: req.text,
        model: req.model,
        model_id: req.model_id,
        voice_id: req.voice_id,
        reading_profile: req.reading_profile,
        prefer_phonemes: req.prefer_phonemes,
    };
    let job = state.submit_job_handler.handle(command).await?;
    let view = JobView {
        progress: job.progress(),
        job,
    };
    let response = JobResponse::new(&view, state.proxy_base(), prefer_proxy(&headers))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ApiResponse::success(response)))
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<JobResponse>>, ApiError> {
    let view = state.get_job_handler.handle(GetJob { job_id }).await?;
    let response = JobResponse::new(&view, state.proxy_base(), prefer_proxy(&headers))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(ApiResponse::success(response)))
}

pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<ApiResponse<CancelJobResponse>>, ApiError> {
    let job = state.cancel_job_handler.handle(CancelJob { job_id }).await?;
    Ok(Json(ApiResponse::success(CancelJobResponse {
        job_id: job.job_id,
        status: job.status,
    })))
}

pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Playlist>>, ApiError> {
    let playlist = state
        .get_playlist_handler
        .handle(GetPlaylist {
            job_id,
            prefer_proxy: prefer_proxy(&headers),
        })
        .await?;
    Ok(Json(ApiResponse::success(playlist)))
}
