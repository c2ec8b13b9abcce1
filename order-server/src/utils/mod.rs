//! 工具模块 - 错误响应与日志
//!
//! - [`AppError`] - HTTP 错误类型
//! - [`logger`] - tracing 初始化

pub mod error;
pub mod logger;

pub use error::{AppError, AppResult, ErrorBody};
