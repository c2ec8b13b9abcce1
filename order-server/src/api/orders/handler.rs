//! Order API Handlers

use std::convert::Infallible;

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use shared::order::{Order, OrderDraft, OrderFilter, OrderStatus};

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// Query params for the admin orders table
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Status label or code ("Shipped", "OUT_FOR_DELIVERY", ...)
    #[serde(default)]
    pub status: Option<String>,
    /// Free text over order number, customer name and email
    #[serde(default)]
    pub search: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> AppResult<OrderFilter> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(
                s.parse::<OrderStatus>()
                    .map_err(|e| AppError::Validation(e.to_string()))?,
            ),
        };
        Ok(OrderFilter {
            status,
            search: self.search,
        })
    }
}

/// Status change request
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Place an order from a checkout draft
pub async fn create(
    State(state): State<ServerState>,
    payload: Result<Json<OrderDraft>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Order>)> {
    let Json(draft) = payload?;
    let order = state.orders.create_order(draft).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List all orders (admin)
pub async fn list(
    State(state): State<ServerState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<Vec<Order>>> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let orders = state.queries.list_all(&filter).await?;
    Ok(Json(orders))
}

/// Find by id, order number or tracking number
pub async fn track(
    State(state): State<ServerState>,
    Path(query): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state
        .queries
        .find(&query)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No order matches {query}")))?;
    Ok(Json(order))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state
        .queries
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Order {id} not found")))?;
    Ok(Json(order))
}

/// Change order status
pub async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> AppResult<Json<Order>> {
    let Json(update) = payload?;
    let order = state
        .orders
        .transition_from_str(&id, &update.status, update.description, update.location)
        .await?;
    Ok(Json(order))
}

/// Customer order history, newest first
pub async fn list_by_customer(
    State(state): State<ServerState>,
    Path(customer_id): Path<String>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state.queries.list_by_customer(&customer_id).await?;
    Ok(Json(orders))
}

fn snapshot_event(order: &Order) -> Event {
    let name = if order.status.is_terminal() {
        "final"
    } else {
        "order"
    };
    Event::default()
        .event(name)
        .id(order.version.to_string())
        .json_data(order)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// SSE stream: current snapshot first, then every newer one.
///
/// The stream ends after a terminal snapshot.
pub async fn events(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let watch = state.queries.watch(&id).await?;
    let initial = watch
        .initial()
        .cloned()
        .ok_or_else(|| AppError::not_found(format!("Order {id} not found")))?;

    tracing::debug!(order_id = %id, status = %initial.status, "SSE subscriber attached");

    let stream = stream::unfold((Some(initial), watch), |(pending, mut watch)| async move {
        let order = match pending {
            Some(order) => order,
            None => watch.next().await?,
        };
        Some((Ok(snapshot_event(&order)), (None, watch)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
