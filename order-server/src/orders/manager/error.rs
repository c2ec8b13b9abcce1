use super::super::traits::StoreError;
use shared::order::{OrderStatus, ParseStatusError};
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Malformed draft or unrecognized status text
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Order is in a terminal state and cannot move
    #[error("Order {order_id} is {from} and can no longer be updated (requested {to})")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order not found: {0}")]
    NotFound(String),

    /// Lost a concurrent write race; re-fetch and retry
    #[error("Order {order_id} was modified concurrently (expected version {expected}, found {actual})")]
    Conflict {
        order_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl ManagerError {
    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        match self {
            ManagerError::Conflict { .. } => true,
            ManagerError::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => ManagerError::NotFound(id),
            StoreError::Conflict {
                order_id,
                expected,
                actual,
            } => ManagerError::Conflict {
                order_id,
                expected,
                actual,
            },
            other => ManagerError::Storage(other),
        }
    }
}

impl From<ParseStatusError> for ManagerError {
    fn from(err: ParseStatusError) -> Self {
        ManagerError::Validation(err.to_string())
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
