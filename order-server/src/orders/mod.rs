//! Order lifecycle module
//!
//! - **traits**: the `OrderStore` port and its error type
//! - **storage**: redb-based store (orders, timelines, indices)
//! - **local**: in-memory store with an optional JSON snapshot
//! - **retry**: timeout + backoff decorator for any store
//! - **manager**: OrdersManager, the status transition engine
//! - **query**: lookups, listings and live subscriptions
//!
//! # Architecture
//!
//! ```text
//! checkout / admin → OrdersManager → OrderStore (redb | local)
//!                         ↓
//!                     Broadcast
//!                         ↓
//!          OrderQueryService (watch / subscribe) → SSE, callbacks
//! ```
//!
//! # Data Flow
//!
//! 1. Checkout submits an OrderDraft; the manager validates and inserts it
//!    with a Placed timeline event
//! 2. Admin requests a status; the manager checks the terminal lock
//! 3. The event is appended with the status change in one store write
//! 4. The updated order is broadcast to all subscribers
//! 5. Readers re-read order + timeline through the query service

pub mod local;
pub mod manager;
pub mod query;
pub mod retry;
pub mod storage;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use local::LocalOrderStore;
pub use manager::{ManagerError, ManagerResult, OrderUpdate, OrdersManager};
pub use query::{OrderQueryService, OrderWatch, SubscriptionHandle, progress_rank};
pub use retry::{RetryPolicy, RetryingOrderStore};
pub use storage::RedbOrderStore;
pub use traits::{OrderStore, StoreError, StoreResult, TimelineAppend};

// Re-export shared types for convenience
pub use shared::order::{
    Order, OrderDraft, OrderFilter, OrderStatus, ProgressRank, TimelineEvent,
};
