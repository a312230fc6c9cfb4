//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                                   GET   健康检查
//! - /v1/models                                  GET   模型白名单
//! - /v1/tts/jobs                                POST  提交任务
//! - /v1/tts/jobs/:job_id                        GET   任务清单与进度
//! - /v1/tts/jobs/:job_id/cancel                 POST  取消任务（幂等）
//! - /v1/tts/jobs/:job_id/segments/:segment_id   GET   片段音频（未就绪时 202）
//! - /v1/tts/jobs/:job_id/playlist               GET   按序号排列的播放列表
//! - /v1/tts/jobs/:job_id/audio                  GET   合并音频（未就绪时 202）
//! - /v1/tts/status                              GET   调度器运行状态
//! - /v1/tts/metrics                             GET   运行指标
//! - /v1/tts/dicts                               GET   已加载词典包
//! - /v1/tts/dicts/lookup?key=                   GET   查词典
//! - /v1/tts/dicts/learn                         POST  音素化/直接写入
//! - /v1/tts/dicts/teach                         POST  直接写入 auto_learn
//! - /v1/tts/dicts/refresh                       POST  重新加载词典包
//! - /v1/tts/dicts/phonemize?text=               GET   直接音素化
//! - /v1/tts/dicts/override                      POST  写入 local_overrides
//! - /v1/tts/dicts/promote                       POST  将已有发音固化到策展词典包
//!
//! 词典路由同时挂载在 /v1/dicts 下

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ping", get(handlers::ping))
        .route("/v1/models", get(handlers::list_models))
        .nest("/v1/dicts", dict_routes())
        .nest("/v1/tts", tts_routes())
}

fn tts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/jobs", job_routes())
        .route("/status", get(handlers::get_status))
        .route("/metrics", get(handlers::get_metrics))
        .nest("/dicts", dict_routes())
}

/// Job 路由
fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::submit_job))
        .route("/:job_id", get(handlers::get_job))
        .route("/:job_id/cancel", post(handlers::cancel_job))
        .route(
            "/:job_id/segments/:segment_id",
            get(handlers::get_segment_audio),
        )
        .route("/:job_id/playlist", get(handlers::get_playlist))
        .route("/:job_id/audio", get(handlers::get_merged_audio))
}

/// Dictionary 路由
fn dict_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::list_dicts))
        .route("/lookup", get(handlers::lookup_pronunciation))
        .route("/learn", post(handlers::learn_pronunciation))
        .route("/teach", post(handlers::teach_pronunciation))
        .route("/refresh", post(handlers::refresh_dicts))
        .route("/phonemize", get(handlers::phonemize_text))
        .route("/override", post(handlers::override_pronunciation))
        .route("/promote", post(handlers::promote_pronunciation))
}
