//! Order API Module
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/orders | POST | 下单 (201) |
//! | /api/orders | GET | 订单列表 (?status=&search=) |
//! | /api/orders/track/{query} | GET | 按 id / 订单号 / 物流单号查找 |
//! | /api/orders/{id} | GET | 订单详情 |
//! | /api/orders/{id}/status | PUT | 状态流转 |
//! | /api/orders/{id}/events | GET | SSE 实时推送 |
//! | /api/customers/{customer_id}/orders | GET | 客户订单历史 |
//!
//! All status changes go through OrdersManager.

mod handler;

use axum::{
    Router,
    routing::{get, put},
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new()
        .nest("/api/orders", routes())
        .route(
            "/api/customers/{customer_id}/orders",
            get(handler::list_by_customer),
        )
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(handler::list).post(handler::create))
        .route("/track/{query}", get(handler::track))
        .route("/{id}", get(handler::get_by_id))
        .route("/{id}/status", put(handler::update_status))
        .route("/{id}/events", get(handler::events))
}
