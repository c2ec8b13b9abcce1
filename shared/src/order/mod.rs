//! Order lifecycle types
//!
//! - Status: the closed set of lifecycle states and their transition rules
//! - Events: immutable timeline entries appended on every status change
//! - Records: the order itself, and its flat persisted shape

pub mod event;
pub mod record;
pub mod status;
pub mod types;

// Re-exports
pub use event::TimelineEvent;
pub use record::{Order, OrderRecord};
pub use status::{OrderStatus, ParseStatusError, ProgressRank};
pub use types::*;
