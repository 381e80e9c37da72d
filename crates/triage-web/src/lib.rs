//! # 分诊系统 HTTP 接口
//!
//! 基于 axum 的 REST API，路由挂载在 `/api/v1` 下，
//! 另提供 `/health` 和 Prometheus 格式的 `/metrics`。

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use server::WebServer;
