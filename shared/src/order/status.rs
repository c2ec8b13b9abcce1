//! Order status - the lifecycle state machine
//!
//! ```text
//! Placed → Confirmed → Processing → Shipped → Out for Delivery → Delivered
//!    └──────────┴───────────┴──────────┴────────────┴──→ Cancelled | Returned
//! ```
//!
//! Delivered, Cancelled and Returned are terminal. The only hard guard is the
//! terminal lock; the forward order is a display convention (see
//! [`ProgressRank`]) and is not enforced between non-terminal states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Placed,
    Confirmed,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
}

/// Collapsed progress-bar position for a status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "step", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressRank {
    /// Step on the forward track, 0 (Placed) to 3 (Delivered)
    Step(u8),
    /// Cancelled or Returned: off the forward track
    NonProgressing,
}

impl ProgressRank {
    /// Final step of the forward track
    pub const MAX_STEP: u8 = 3;

    /// Step value, if on the forward track
    pub fn step(self) -> Option<u8> {
        match self {
            ProgressRank::Step(step) => Some(step),
            ProgressRank::NonProgressing => None,
        }
    }
}

impl OrderStatus {
    /// All statuses in lifecycle order
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    /// Human-facing label, e.g. "Out for Delivery"
    pub fn label(self) -> &'static str {
        match self {
            OrderStatus::Placed => "Placed",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::OutForDelivery => "Out for Delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
        }
    }

    /// Wire name, matches the serde representation
    pub fn code(self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
        }
    }

    /// No further transitions once reached
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Returned
        )
    }

    /// Whether an order in `self` may move to `next`.
    ///
    /// Same-status requests are idempotent no-ops and are not transitions;
    /// they return `false` here and are handled by the caller.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self != next && !self.is_terminal()
    }

    /// Progress-bar rank: Confirmed/Processing share step 1,
    /// Shipped/Out for Delivery share step 2.
    pub fn progress_rank(self) -> ProgressRank {
        match self {
            OrderStatus::Placed => ProgressRank::Step(0),
            OrderStatus::Confirmed | OrderStatus::Processing => ProgressRank::Step(1),
            OrderStatus::Shipped | OrderStatus::OutForDelivery => ProgressRank::Step(2),
            OrderStatus::Delivered => ProgressRank::Step(3),
            OrderStatus::Cancelled | OrderStatus::Returned => ProgressRank::NonProgressing,
        }
    }

    /// Timeline description used when the caller supplies none
    pub fn canonical_description(self) -> &'static str {
        match self {
            OrderStatus::Placed => "Order has been placed",
            OrderStatus::Confirmed => "Order has been confirmed and is being prepared",
            OrderStatus::Processing => "Order is being processed and packed",
            OrderStatus::Shipped => "Order has been shipped",
            OrderStatus::OutForDelivery => "Order is out for delivery",
            OrderStatus::Delivered => "Order has been delivered successfully",
            OrderStatus::Cancelled => "Order has been cancelled",
            OrderStatus::Returned => "Order has been returned",
        }
    }

    /// Statuses that require a tracking number
    pub fn is_in_transit(self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::OutForDelivery)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unrecognized status text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized order status: {0:?}")]
pub struct ParseStatusError(pub String);

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    /// Accepts "Out for Delivery", "OUT_FOR_DELIVERY", "out-for-delivery", ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        OrderStatus::ALL
            .into_iter()
            .find(|status| status.code() == normalized)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                OrderStatus::Delivered,
                OrderStatus::Cancelled,
                OrderStatus::Returned
            ]
        );
    }

    #[test]
    fn test_terminal_states_are_frozen() {
        for from in [
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Returned,
        ] {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn test_cancel_and_return_reachable_from_any_open_state() {
        for from in OrderStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(OrderStatus::Cancelled));
            assert!(from.can_transition_to(OrderStatus::Returned));
        }
    }

    #[test]
    fn test_progress_rank_table() {
        use ProgressRank::*;
        assert_eq!(OrderStatus::Placed.progress_rank(), Step(0));
        assert_eq!(OrderStatus::Confirmed.progress_rank(), Step(1));
        assert_eq!(OrderStatus::Processing.progress_rank(), Step(1));
        assert_eq!(OrderStatus::Shipped.progress_rank(), Step(2));
        assert_eq!(OrderStatus::OutForDelivery.progress_rank(), Step(2));
        assert_eq!(OrderStatus::Delivered.progress_rank(), Step(ProgressRank::MAX_STEP));
        assert_eq!(OrderStatus::Cancelled.progress_rank(), NonProgressing);
        assert_eq!(OrderStatus::Returned.progress_rank(), NonProgressing);
        assert_eq!(OrderStatus::Returned.progress_rank().step(), None);
    }

    #[test]
    fn test_parse_accepts_labels_and_codes() {
        assert_eq!(
            "Out for Delivery".parse::<OrderStatus>(),
            Ok(OrderStatus::OutForDelivery)
        );
        assert_eq!(
            "OUT_FOR_DELIVERY".parse::<OrderStatus>(),
            Ok(OrderStatus::OutForDelivery)
        );
        assert_eq!(
            "out-for-delivery".parse::<OrderStatus>(),
            Ok(OrderStatus::OutForDelivery)
        );
        assert_eq!(" shipped ".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        for status in OrderStatus::ALL {
            assert_eq!(status.label().parse::<OrderStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        let err = "Lost in Transit".parse::<OrderStatus>().unwrap_err();
        assert_eq!(err, ParseStatusError("Lost in Transit".to_string()));
        assert!("".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_code() {
        let json = serde_json::to_string(&OrderStatus::OutForDelivery).unwrap();
        assert_eq!(json, "\"OUT_FOR_DELIVERY\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::OutForDelivery);
    }

    #[test]
    fn test_canonical_descriptions() {
        assert_eq!(
            OrderStatus::Shipped.canonical_description(),
            "Order has been shipped"
        );
        assert_eq!(
            OrderStatus::Delivered.canonical_description(),
            "Order has been delivered successfully"
        );
        assert_eq!(
            OrderStatus::Confirmed.canonical_description(),
            "Order has been confirmed and is being prepared"
        );
    }
}
