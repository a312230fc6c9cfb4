//! Dictionary Handlers

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::application::{
    LearnMode, LearnPronunciation, ListDicts, LookupPronunciation, OverridePronunciation,
    PhonemizeText, PromotePronunciation, RefreshDicts, TeachPronunciation,
};
use crate::infrastructure::http::dto::{
    ApiResponse, LearnRequest, LookupParams, OverrideRequest, PackEntryResponse,
    PackListResponse, PhonemizeParams, PhonemizeResponse, PromoteRequest, PronunciationResponse,
    TeachRequest,
};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn list_dicts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PackListResponse>>, ApiError> {
    let packs = state.list_dicts_handler.handle(ListDicts).await?;
    Ok(Json(ApiResponse::success(PackListResponse::new(packs))))
}

pub async fn lookup_pronunciation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupParams>,
) -> Result<Json<ApiResponse<PronunciationResponse>>, ApiError> {
    let view = state
        .lookup_handler
        .handle(LookupPronunciation { key: params.key })
        .await?;
    Ok(Json(ApiResponse::success(PronunciationResponse {
        key: view.key,
        phonemes: view.phonemes,
        source_pack: view.source_pack,
    })))
}

pub async fn learn_pronunciation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LearnRequest>,
) -> Result<Json<ApiResponse<PronunciationResponse>>, ApiError> {
    let command = LearnPronunciation {
        key: req.key,
        text: req.text,
        phonemes: req.phonemes,
        mode: LearnMode::parse(req.mode.as_deref()),
    };
    let learned = state.learn_handler.handle(command).await?;
    Ok(Json(ApiResponse::success(learned.into())))
}

pub async fn teach_pronunciation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TeachRequest>,
) -> Result<Json<ApiResponse<PronunciationResponse>>, ApiError> {
    let learned = state
        .teach_handler
        .handle(TeachPronunciation {
            key: req.key,
            phonemes: req.phonemes,
        })
        .await?;
    Ok(Json(ApiResponse::success(learned.into())))
}

pub async fn refresh_dicts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<PackListResponse>>, ApiError> {
    let packs = state.refresh_dicts_handler.handle(RefreshDicts).await?;
    Ok(Json(ApiResponse::success(PackListResponse::new(packs))))
}

pub async fn phonemize_text(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PhonemizeParams>,
) -> Result<Json<ApiResponse<PhonemizeResponse>>, ApiError> {
    let result = state
        .phonemize_handler
        .handle(PhonemizeText { text: params.text })
        .await?;
    Ok(Json(ApiResponse::success(result.into())))
}

pub async fn override_pronunciation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OverrideRequest>,
) -> Result<Json<ApiResponse<PackEntryResponse>>, ApiError> {
    let written = state
        .override_handler
        .handle(OverridePronunciation {
            key: req.key,
            phonemes: req.phonemes,
            pack: req.pack,
        })
        .await?;
    Ok(Json(ApiResponse::success(written.into())))
}

pub async fn promote_pronunciation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PromoteRequest>,
) -> Result<Json<ApiResponse<PackEntryResponse>>, ApiError> {
    let written = state
        .promote_handler
        .handle(PromotePronunciation {
            key: req.key,
            target_pack: req.target_pack,
            overwrite: req.overwrite,
        })
        .await?;
    Ok(Json(ApiResponse::success(written.into())))
}
