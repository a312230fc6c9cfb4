//! HTTP Server
//!
//! 先绑定端口再启动后台任务，端口占用时进程直接退出

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use http::header::{
    ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_TYPE, ETAG, IF_NONE_MATCH, RETRY_AFTER,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::{request_context_middleware, REQUEST_ID_HEADER};
use super::routes::create_routes;
use super::state::AppState;

/// 请求体上限（任务文本 JSON）
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// 构建带中间件的 Router
///
/// 浏览器播放器需要读到 ETag / Retry-After 等响应头
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([CONTENT_TYPE, IF_NONE_MATCH, REQUEST_ID_HEADER])
        .expose_headers([
            ETAG,
            RETRY_AFTER,
            CONTENT_DISPOSITION,
            ACCEPT_RANGES,
            REQUEST_ID_HEADER,
        ])
        .max_age(Duration::from_secs(3600));

    create_routes()
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// 已绑定端口的 HTTP 服务器
pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn bind(addr: &str, state: AppState) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: build_router(Arc::new(state)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 运行直到 token 被取消，处理中的请求会先完成
    pub async fn serve(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(addr = %addr, "HTTP server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!(addr = %addr, "HTTP server stopped");
        Ok(())
    }
}
