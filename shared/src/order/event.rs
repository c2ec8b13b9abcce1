//! Timeline events - immutable facts appended on every status change

use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// Timeline event - immutable audit record of one status change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEvent {
    /// Order this event belongs to
    pub order_id: String,
    /// Append position within the order, starting at 1.
    /// This is the AUTHORITATIVE ordering; timestamps may not be monotonic.
    pub sequence: u64,
    /// Status entered
    pub status: OrderStatus,
    /// Human-readable cause
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Server timestamp (Unix milliseconds), set at append time
    pub timestamp: i64,
}

impl TimelineEvent {
    pub fn new(
        order_id: impl Into<String>,
        sequence: u64,
        status: OrderStatus,
        description: Option<String>,
        location: Option<String>,
        timestamp: i64,
    ) -> Self {
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| status.canonical_description().to_string());
        Self {
            order_id: order_id.into(),
            sequence,
            status,
            description,
            location,
            timestamp,
        }
    }
}
