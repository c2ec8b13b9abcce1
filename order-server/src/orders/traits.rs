//! Order store port
//!
//! One async interface over durable order storage. Implementations:
//!
//! - [`RedbOrderStore`](super::storage::RedbOrderStore) - embedded redb database
//! - [`LocalOrderStore`](super::local::LocalOrderStore) - in-memory map with an
//!   optional JSON snapshot file (local fallback)
//! - [`RetryingOrderStore`](super::retry::RetryingOrderStore) - timeout and
//!   backoff decorator over either of the above

use async_trait::async_trait;
use shared::order::{Order, OrderFilter, TimelineEvent};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Version conflict on order {order_id}: expected {expected}, found {actual}")]
    Conflict {
        order_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Duplicate order: {0}")]
    Duplicate(String),

    #[error("Storage operation timed out: {0}")]
    Timeout(&'static str),

    #[error("Storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// Transient failures are worth retrying; logical outcomes are not
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_)
                | StoreError::Transaction(_)
                | StoreError::Storage(_)
                | StoreError::Commit(_)
                | StoreError::Io(_)
                | StoreError::Timeout(_)
                | StoreError::Task(_)
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One atomic status change: the event plus the fields written with it
#[derive(Debug, Clone)]
pub struct TimelineAppend {
    /// Version the caller read; the append is rejected if it moved
    pub expected_version: u64,
    /// Event to append; the store assigns `sequence = expected_version + 1`
    pub event: TimelineEvent,
    /// Tracking number to assign (ignored if the order already has one)
    pub tracking_number: Option<String>,
}

/// Persistence for orders and their timelines
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Reserve the next order counter value (crash-safe, never reused)
    async fn next_order_number(&self) -> StoreResult<String>;

    /// Persist a new order with its initial timeline.
    ///
    /// Fails with `Duplicate` if the id or order number already exists.
    async fn insert(&self, order: &Order) -> StoreResult<()>;

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Order>>;

    async fn get_by_order_number(&self, order_number: &str) -> StoreResult<Option<Order>>;

    async fn get_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>>;

    /// Orders of one customer, newest first
    async fn list_by_customer(&self, customer_id: &str) -> StoreResult<Vec<Order>>;

    /// All orders passing the filter, newest first
    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    /// Append a timeline event and update status/updated_at/version as one unit.
    ///
    /// Only the status transition engine calls this.
    async fn append_timeline_event(
        &self,
        order_id: &str,
        append: TimelineAppend,
    ) -> StoreResult<Order>;
}

/// Newest first; ties broken by order number so listings are stable
pub(crate) fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.order_number.cmp(&a.order_number))
    });
}

/// Apply an append to a loaded order after checking the version.
///
/// Shared by both stores so they agree on the conflict rule.
pub(crate) fn apply_append(mut order: Order, append: TimelineAppend) -> StoreResult<Order> {
    if order.version != append.expected_version {
        return Err(StoreError::Conflict {
            order_id: order.id,
            expected: append.expected_version,
            actual: order.version,
        });
    }
    if order.tracking_number.is_none() {
        order.tracking_number = append.tracking_number;
    }
    let mut event = append.event;
    event.sequence = order.version + 1;
    order.apply_event(event);
    Ok(order)
}
