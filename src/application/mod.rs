//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（协调后端、片段缓存、合成引擎、编码器、合并锁）
//! - scheduler: 任务/片段调度核心
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - metrics: 运行指标
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod queries;
pub mod scheduler;

// Re-exports
pub use commands::{
    handlers::{
        CancelJobHandler, LearnPronunciationHandler, LearnedPronunciation,
        OverridePronunciationHandler, PackEntryWritten, PromotePronunciationHandler,
        RefreshDictsHandler, SubmitJobHandler, TeachPronunciationHandler,
    },
    CancelJob, LearnMode, LearnPronunciation, OverridePronunciation, PromotePronunciation,
    RefreshDicts, SubmitJob, TeachPronunciation,
};

pub use error::{ApplicationError, SubmitError};
pub use metrics::{Metrics, MetricsSnapshot};

pub use ports::{
    AudioEncoderPort, AudioFormat, CacheError, CoordinationError, CoordinationPort, EncodeError,
    MergeLockPort, SegmentCachePort, SynthesisError, Synthesizer, SynthesizerFactory,
};

pub use queries::{
    handlers::{
        GetJobHandler, GetMergedAudioHandler, GetMetricsHandler, GetPlaylistHandler,
        GetSegmentAudioHandler, GetStatusHandler, ListDictsHandler, ListModelsHandler,
        LookupPronunciationHandler, PhonemizeTextHandler,
    },
    GetJob, GetMergedAudio, GetMetrics, GetPlaylist, GetSegmentAudio, GetStatus, JobView,
    ListDicts, ListModels, LookupPronunciation, MetricsReport, ModelView, PhonemizeText,
    PhonemizedText, Playlist, PlaylistEntry, PronunciationView, SegmentAudio, SegmentUrls,
};

pub use scheduler::{JobManager, JobRequest, SchedulerDeps, SchedulerSettings, StatusSnapshot};
