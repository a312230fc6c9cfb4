//! HTTP Error Handling
//!
//! 错误统一使用 `{errno, error, data}` 响应体，HTTP 状态码与 errno 一致

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::ports::CoordinationError;
use crate::application::{ApplicationError, SubmitError};
use crate::domain::pronunciation::DictError;

/// 统一错误响应格式
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errno: i32,
    pub error: String,
    pub data: Option<()>,
}

impl ErrorResponse {
    pub fn new(errno: i32, error: impl Into<String>) -> Self {
        Self {
            errno,
            error: error.into(),
            data: None,
        }
    }
}

/// 错误码定义
pub mod errno {
    pub const BAD_REQUEST: i32 = 400;
    pub const NOT_FOUND: i32 = 404;
    pub const CONFLICT: i32 = 409;
    pub const PAYLOAD_TOO_LARGE: i32 = 413;
    pub const TOO_MANY_REQUESTS: i32 = 429;
    pub const INTERNAL_ERROR: i32 = 500;
    pub const SERVICE_UNAVAILABLE: i32 = 503;
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    PayloadTooLarge(String),
    TooManyRequests(String),
    Internal(String),
    ServiceUnavailable(String),
}

impl ApiError {
    fn errno(&self) -> i32 {
        match self {
            ApiError::NotFound(_) => errno::NOT_FOUND,
            ApiError::BadRequest(_) => errno::BAD_REQUEST,
            ApiError::Conflict(_) => errno::CONFLICT,
            ApiError::PayloadTooLarge(_) => errno::PAYLOAD_TOO_LARGE,
            ApiError::TooManyRequests(_) => errno::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => errno::INTERNAL_ERROR,
            ApiError::ServiceUnavailable(_) => errno::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::TooManyRequests(msg)
            | ApiError::Internal(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let errno = self.errno();
        let msg = self.message();
        match &self {
            ApiError::Internal(_) => {
                tracing::error!(errno = errno, error = %msg, "Internal server error")
            }
            ApiError::ServiceUnavailable(_) => {
                tracing::error!(errno = errno, error = %msg, "Service unavailable")
            }
            _ => tracing::warn!(errno = errno, error = %msg, "Request rejected"),
        }

        let status =
            StatusCode::from_u16(errno as u16).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::new(errno, msg))).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let msg = e.to_string();
        match e {
            SubmitError::ModelNotAllowed { .. }
            | SubmitError::TooManySegments { .. }
            | SubmitError::EmptyText => ApiError::BadRequest(msg),
            SubmitError::TextTooLong { .. } => ApiError::PayloadTooLarge(msg),
            SubmitError::NoWorkersOnline => ApiError::ServiceUnavailable(msg),
            SubmitError::TooManyActiveJobs => ApiError::TooManyRequests(msg),
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        match e {
            ApplicationError::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{} not found: {}", resource_type, id))
            }
            ApplicationError::ValidationError(msg) => ApiError::BadRequest(msg),
            ApplicationError::Submit(e) => e.into(),
            e @ ApplicationError::NotReady { .. } => ApiError::Conflict(e.to_string()),
            ApplicationError::InvalidState(msg) => ApiError::Internal(msg),
            ApplicationError::Coordination(e @ CoordinationError::Serialization(_)) => {
                ApiError::Internal(e.to_string())
            }
            ApplicationError::Coordination(e) => ApiError::ServiceUnavailable(e.to_string()),
            ApplicationError::Dict(e @ DictError::EntryExists(_)) => {
                ApiError::Conflict(e.to_string())
            }
            ApplicationError::Dict(e @ DictError::InvalidEntry(_)) => {
                ApiError::BadRequest(e.to_string())
            }
            e => ApiError::Internal(e.to_string()),
        }
    }
}
