//! Status / Metrics / Models Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::application::{GetMetrics, GetStatus, ListModels, MetricsReport, StatusSnapshot};
use crate::infrastructure::http::dto::{ApiResponse, ModelListResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<StatusSnapshot>>, ApiError> {
    let snapshot = state.get_status_handler.handle(GetStatus).await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<MetricsReport>>, ApiError> {
    let report = state.get_metrics_handler.handle(GetMetrics).await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<ModelListResponse>>, ApiError> {
    let models = state.list_models_handler.handle(ListModels).await?;
    Ok(Json(ApiResponse::success(ModelListResponse { models })))
}
