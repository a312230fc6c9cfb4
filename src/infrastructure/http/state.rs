//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    CancelJobHandler, LearnPronunciationHandler, OverridePronunciationHandler,
    PromotePronunciationHandler, RefreshDictsHandler, SubmitJobHandler,
    TeachPronunciationHandler,
    // Query handlers
    GetJobHandler, GetMergedAudioHandler, GetMetricsHandler, GetPlaylistHandler,
    GetSegmentAudioHandler, GetStatusHandler, ListDictsHandler, ListModelsHandler,
    LookupPronunciationHandler, PhonemizeTextHandler,
    // Scheduler
    JobManager,
};

/// 应用状态
pub struct AppState {
    pub manager: Arc<JobManager>,

    // ========== Command Handlers ==========
    pub submit_job_handler: SubmitJobHandler,
    pub cancel_job_handler: CancelJobHandler,
    pub learn_handler: LearnPronunciationHandler,
    pub teach_handler: TeachPronunciationHandler,
    pub refresh_dicts_handler: RefreshDictsHandler,
    pub override_handler: OverridePronunciationHandler,
    pub promote_handler: PromotePronunciationHandler,

    // ========== Query Handlers ==========
    pub get_job_handler: GetJobHandler,
    pub get_segment_audio_handler: GetSegmentAudioHandler,
    pub get_playlist_handler: GetPlaylistHandler,
    pub get_merged_audio_handler: GetMergedAudioHandler,
    pub get_status_handler: GetStatusHandler,
    pub get_metrics_handler: GetMetricsHandler,
    pub list_dicts_handler: ListDictsHandler,
    pub lookup_handler: LookupPronunciationHandler,
    pub phonemize_handler: PhonemizeTextHandler,
    pub list_models_handler: ListModelsHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(manager: Arc<JobManager>) -> Self {
        let resolver = manager.resolver().clone();
        Self {
            // Command handlers
            submit_job_handler: SubmitJobHandler::new(manager.clone()),
            cancel_job_handler: CancelJobHandler::new(manager.clone()),
            learn_handler: LearnPronunciationHandler::new(resolver.clone()),
            teach_handler: TeachPronunciationHandler::new(resolver.clone()),
            refresh_dicts_handler: RefreshDictsHandler::new(resolver.clone()),
            override_handler: OverridePronunciationHandler::new(resolver.clone()),
            promote_handler: PromotePronunciationHandler::new(resolver.clone()),

            // Query handlers
            get_job_handler: GetJobHandler::new(manager.clone()),
            get_segment_audio_handler: GetSegmentAudioHandler::new(manager.clone()),
            get_playlist_handler: GetPlaylistHandler::new(manager.clone()),
            get_merged_audio_handler: GetMergedAudioHandler::new(manager.clone()),
            get_status_handler: GetStatusHandler::new(manager.clone()),
            get_metrics_handler: GetMetricsHandler::new(manager.clone()),
            list_models_handler: ListModelsHandler::new(manager.clone()),
            list_dicts_handler: ListDictsHandler::new(resolver.clone()),
            lookup_handler: LookupPronunciationHandler::new(resolver.clone()),
            phonemize_handler: PhonemizeTextHandler::new(resolver),

            manager,
        }
    }

    /// 片段代理地址前缀
    pub fn proxy_base(&self) -> &str {
        &self.manager.settings().public_segment_base_url
    }
}
