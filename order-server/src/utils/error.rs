//! 统一错误处理
//!
//! Every failed request answers with the same JSON body:
//!
//! ```json
//! { "code": "E0005", "message": "Order ... can no longer be updated" }
//! ```
//!
//! | Code | Status | Meaning |
//! |------|--------|---------|
//! | E0002 | 400 | Validation failed |
//! | E0003 | 404 | Order not found |
//! | E0004 | 409 | Concurrent modification, retry |
//! | E0005 | 422 | Terminal order, no further updates |
//! | E9003 | 503 | Storage unavailable, retry later |
//! | E9001 | 500 | Internal error |

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::orders::ManagerError;

/// Error response body
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// 应用错误枚举
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    /// 验证失败 (400)
    Validation(String),

    #[error("Order not found: {0}")]
    /// 订单不存在 (404)
    NotFound(String),

    #[error("Conflict: {0}")]
    /// 并发冲突 (409)
    Conflict(String),

    #[error("Invalid transition: {0}")]
    /// 终态订单不可再变更 (422)
    InvalidTransition(String),

    #[error("Storage unavailable: {0}")]
    /// 存储暂不可用 (503)
    Storage(String),

    #[error("Internal server error: {0}")]
    /// 内部错误 (500)
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "E0002",
            AppError::NotFound(_) => "E0003",
            AppError::Conflict(_) => "E0004",
            AppError::InvalidTransition(_) => "E0005",
            AppError::Storage(_) => "E9003",
            AppError::Internal(_) => "E9001",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Storage(msg) => {
                error!(target: "storage", error = %msg, "Storage error occurred");
                "Storage temporarily unavailable, please retry".to_string()
            }
            AppError::Internal(msg) => {
                error!(target: "internal", error = %msg, "Internal error occurred");
                "Internal server error".to_string()
            }
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::InvalidTransition(msg) => msg.clone(),
        };

        let body = Json(ErrorBody {
            code: self.code().to_string(),
            message,
        });
        (self.status(), body).into_response()
    }
}

impl From<ManagerError> for AppError {
    fn from(err: ManagerError) -> Self {
        match &err {
            ManagerError::Validation(msg) => AppError::Validation(msg.clone()),
            ManagerError::NotFound(id) => AppError::NotFound(format!("Order not found: {id}")),
            ManagerError::Conflict { .. } => AppError::Conflict(err.to_string()),
            ManagerError::InvalidTransition { .. } => AppError::InvalidTransition(err.to_string()),
            ManagerError::Storage(e) if e.is_transient() => AppError::Storage(e.to_string()),
            ManagerError::Storage(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::StoreError;
    use shared::order::OrderStatus;

    #[test]
    fn test_manager_error_mapping() {
        let cases = [
            (
                ManagerError::Validation("items empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (ManagerError::NotFound("o-1".into()), StatusCode::NOT_FOUND),
            (
                ManagerError::Conflict {
                    order_id: "o-1".into(),
                    expected: 1,
                    actual: 2,
                },
                StatusCode::CONFLICT,
            ),
            (
                ManagerError::InvalidTransition {
                    order_id: "o-1".into(),
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Shipped,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ManagerError::Storage(StoreError::Timeout("get_by_id")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ManagerError::Storage(StoreError::Duplicate("ORD100001".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let response = AppError::Internal("redb: page 42 corrupt".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
