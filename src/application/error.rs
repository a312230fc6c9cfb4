//! 应用层错误定义
//!
//! 统一的命令/查询错误类型

use thiserror::Error;

use crate::application::ports::{CacheError, CoordinationError, EncodeError, SynthesisError};
use crate::domain::job::JobProgress;
use crate::domain::pronunciation::DictError;

/// 提交校验错误
///
/// 提交被拒绝时不会创建任务，也不会占用准入名额
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubmitError {
    #[error("model_id '{model}' not allowed; allowed: {allowed}")]
    ModelNotAllowed { model: String, allowed: String },

    #[error("text too long: {len} > {max}")]
    TextTooLong { len: usize, max: usize },

    #[error("no workers online")]
    NoWorkersOnline,

    #[error("too many segments: {count} > {max}")]
    TooManySegments { count: usize, max: usize },

    #[error("too many active jobs")]
    TooManyActiveJobs,

    #[error("text is empty")]
    EmptyText,
}

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 提交被拒绝
    #[error(transparent)]
    Submit(#[from] SubmitError),

    /// 结果尚未就绪
    #[error("Not ready: {}/{} segments ready", progress.ready, progress.total)]
    NotReady { progress: JobProgress },

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Coordination error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Dictionary error: {0}")]
    Dict(#[from] DictError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<serde_json::Error> for ApplicationError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApplicationError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::InternalError(err.to_string())
    }
}
