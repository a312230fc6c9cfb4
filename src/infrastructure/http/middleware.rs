//! HTTP Middleware
//!
//! 请求上下文：为每个请求分配 request id，任务相关路径附带 job_id，
//! 并在同一 span 内记录 4xx / 5xx 响应

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 64;

/// 请求 id，放在 request extensions 中供 handler 读取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// 沿用调用方的 x-request-id（可打印且不超长），否则新生成
fn request_id_of(request: &Request) -> String {
    request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .filter(|v| v.chars().all(|c| c.is_ascii_graphic()))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

/// 从 `/.../jobs/{job_id}/...` 中取出任务 id
fn job_id_of(path: &str) -> Option<&str> {
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    parts.find(|p| *p == "jobs")?;
    parts.next()
}

/// 请求上下文中间件
///
/// 202（结果未就绪）属于正常轮询，不记录
pub async fn request_context_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request_id_of(&request);
    let method = request.method().clone();
    let uri = request.uri().clone();
    let job_id = job_id_of(uri.path()).unwrap_or_default().to_string();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        job_id = %job_id,
    );
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    span.in_scope(|| {
        if status.is_server_error() {
            tracing::error!(
                method = %method,
                uri = %uri,
                status = status.as_u16(),
                elapsed_ms = elapsed_ms,
                "HTTP server error"
            );
        } else if status.is_client_error() {
            tracing::warn!(
                method = %method,
                uri = %uri,
                status = status.as_u16(),
                elapsed_ms = elapsed_ms,
                "HTTP client error"
            );
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::get,
        Extension, Router,
    };
    use tower::util::ServiceExt;

    fn router() -> Router {
        Router::new()
            .route("/pending", get(|| async { StatusCode::ACCEPTED }))
            .route("/busy", get(|| async { StatusCode::TOO_MANY_REQUESTS }))
            .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route(
                "/echo",
                get(|Extension(id): Extension<RequestId>| async move { id.0 }),
            )
            .layer(axum::middleware::from_fn(request_context_middleware))
    }

    #[tokio::test]
    async fn test_status_passes_through() {
        for (uri, expected) in [
            ("/pending", StatusCode::ACCEPTED),
            ("/busy", StatusCode::TOO_MANY_REQUESTS),
            ("/broken", StatusCode::SERVICE_UNAVAILABLE),
            ("/missing", StatusCode::NOT_FOUND),
        ] {
            let request = HttpRequest::builder().uri(uri).body(Body::empty()).unwrap();
            let response = router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), expected);
            assert!(response.headers().contains_key(&REQUEST_ID_HEADER));
        }
    }

    #[tokio::test]
    async fn test_request_id_is_propagated() {
        let request = HttpRequest::builder()
            .uri("/echo")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"abc-123");
    }

    #[tokio::test]
    async fn test_invalid_request_id_is_replaced() {
        let long = "x".repeat(MAX_REQUEST_ID_LEN + 1);
        for supplied in ["", "has space", long.as_str()] {
            let request = HttpRequest::builder()
                .uri("/pending")
                .header("x-request-id", supplied)
                .body(Body::empty())
                .unwrap();
            let response = router().oneshot(request).await.unwrap();
            let id = response.headers()["x-request-id"].to_str().unwrap();
            assert_eq!(id.len(), 32);
            assert_ne!(id, supplied);
        }
    }

    #[test]
    fn test_job_id_from_path() {
        assert_eq!(job_id_of("/v1/tts/jobs/abc"), Some("abc"));
        assert_eq!(job_id_of("/v1/tts/jobs/abc/audio"), Some("abc"));
        assert_eq!(job_id_of("/v1/tts/jobs"), None);
        assert_eq!(job_id_of("/v1/tts/status"), None);
    }
}
