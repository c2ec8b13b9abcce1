//! Shared types for the storefront order core
//!
//! Domain records used by the order server and by any surface that
//! renders orders (admin console, customer tracking view).

pub mod order;
pub mod util;

// Re-exports
pub use order::{
    Order, OrderDraft, OrderFilter, OrderRecord, OrderStatus, ProgressRank, TimelineEvent,
};
pub use serde::{Deserialize, Serialize};
