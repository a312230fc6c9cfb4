//! HTTP Layer - RESTful API
//!
//! 路由层只做请求/响应转换，业务逻辑在 application 层

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;


pub use error::ApiError;
pub use routes::create_routes;
pub use server::{build_router, HttpServer};
pub use state::AppState;
