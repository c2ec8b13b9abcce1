//! Order record - one customer purchase plus its timeline
//!
//! The persisted shape is storage-agnostic: a flat [`OrderRecord`] plus a
//! child collection of [`TimelineEvent`]s keyed by `(order_id, sequence)`.
//! [`Order::into_parts`] / [`Order::from_parts`] convert between the two.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{LineItem, OrderDraft, PaymentMethod, PaymentStatus, ShippingAddress};
use super::{OrderStatus, TimelineEvent};

/// Order - full view with timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Order ID (opaque, assigned by server)
    pub id: String,
    /// Human-facing number, immutable once assigned
    pub order_number: String,
    /// Customer ID (None = guest)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    /// Current status, always equal to the last timeline event's status
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
    /// Number of timeline events appended (optimistic concurrency token)
    pub version: u64,
    /// Status history in append order
    pub timeline: Vec<TimelineEvent>,
}

/// Flat persisted record - everything except the timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub id: String,
    pub order_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub items: Vec<LineItem>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub version: u64,
}

impl Order {
    /// Create a freshly placed order from a validated draft.
    ///
    /// The order starts with exactly one timeline event (Placed, sequence 1).
    pub fn placed(id: String, order_number: String, draft: OrderDraft, now: i64) -> Self {
        let placed = TimelineEvent::new(id.clone(), 1, OrderStatus::Placed, None, None, now);
        Self {
            id,
            order_number,
            customer_id: draft.customer_id,
            customer_name: draft.customer_name,
            customer_email: draft.customer_email,
            items: draft.items,
            subtotal: draft.subtotal,
            shipping_cost: draft.shipping_cost,
            tax: draft.tax,
            total: draft.total,
            shipping_address: draft.shipping_address,
            payment_method: draft.payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Placed,
            tracking_number: None,
            estimated_delivery: draft.estimated_delivery,
            created_at: now,
            updated_at: now,
            version: 1,
            timeline: vec![placed],
        }
    }

    /// Most recently appended event
    pub fn last_event(&self) -> Option<&TimelineEvent> {
        self.timeline.last()
    }

    /// status/timeline/version agree with each other
    pub fn is_consistent(&self) -> bool {
        self.last_event().map(|e| e.status) == Some(self.status)
            && self.version == self.timeline.len() as u64
            && self
                .timeline
                .iter()
                .enumerate()
                .all(|(i, e)| e.sequence == i as u64 + 1 && e.order_id == self.id)
    }

    /// Apply an appended event in place (status, updated_at, version)
    pub fn apply_event(&mut self, event: TimelineEvent) {
        self.status = event.status;
        self.updated_at = event.timestamp.max(self.updated_at);
        self.version = event.sequence;
        self.timeline.push(event);
    }

    /// Split into the flat record and the timeline
    pub fn into_parts(self) -> (OrderRecord, Vec<TimelineEvent>) {
        let record = OrderRecord {
            id: self.id,
            order_number: self.order_number,
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            items: self.items,
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            tax: self.tax,
            total: self.total,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
            payment_status: self.payment_status,
            status: self.status,
            tracking_number: self.tracking_number,
            estimated_delivery: self.estimated_delivery,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        };
        (record, self.timeline)
    }

    /// Reassemble from the flat record and its timeline (sorted by sequence)
    pub fn from_parts(record: OrderRecord, mut timeline: Vec<TimelineEvent>) -> Self {
        timeline.sort_by_key(|e| e.sequence);
        Self {
            id: record.id,
            order_number: record.order_number,
            customer_id: record.customer_id,
            customer_name: record.customer_name,
            customer_email: record.customer_email,
            items: record.items,
            subtotal: record.subtotal,
            shipping_cost: record.shipping_cost,
            tax: record.tax,
            total: record.total,
            shipping_address: record.shipping_address,
            payment_method: record.payment_method,
            payment_status: record.payment_status,
            status: record.status,
            tracking_number: record.tracking_number,
            estimated_delivery: record.estimated_delivery,
            created_at: record.created_at,
            updated_at: record.updated_at,
            version: record.version,
            timeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_draft() -> OrderDraft {
        OrderDraft {
            customer_id: Some("cust-1".to_string()),
            customer_name: "Ada Obi".to_string(),
            customer_email: "ada@example.com".to_string(),
            items: vec![LineItem {
                product_id: "p-1".to_string(),
                name: "Smart Lamp".to_string(),
                variant: Some("White".to_string()),
                unit_price: Decimal::new(4999, 2),
                quantity: 2,
                image: Some("/img/lamp.png".to_string()),
            }],
            subtotal: Decimal::new(9998, 2),
            shipping_cost: Decimal::new(500, 2),
            tax: Decimal::ZERO,
            total: Decimal::new(10498, 2),
            shipping_address: ShippingAddress {
                name: "Ada Obi".to_string(),
                address_line1: "12 Marina Rd".to_string(),
                address_line2: Some("Flat 3".to_string()),
                city: "Lagos".to_string(),
                region: Some("LA".to_string()),
                postal_code: "100001".to_string(),
                country: "NG".to_string(),
                phone: "+2348000000000".to_string(),
                email: Some("ada@example.com".to_string()),
            },
            payment_method: PaymentMethod::CashOnDelivery,
            estimated_delivery: Some("3-5 business days".to_string()),
        }
    }

    #[test]
    fn test_placed_order_has_single_placed_event() {
        let order = Order::placed("o-1".into(), "ORD100001".into(), sample_draft(), 1_000);
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.timeline[0].status, OrderStatus::Placed);
        assert_eq!(order.created_at, order.updated_at);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.is_consistent());
    }

    #[test]
    fn test_parts_round_trip_through_json() {
        let mut order = Order::placed("o-1".into(), "ORD100001".into(), sample_draft(), 1_000);
        order.apply_event(TimelineEvent::new(
            "o-1",
            2,
            OrderStatus::Shipped,
            None,
            Some("Warehouse".into()),
            2_000,
        ));
        order.tracking_number = Some("TRK0000000001".into());

        let (record, timeline) = order.clone().into_parts();
        let record_json = serde_json::to_vec(&record).unwrap();
        let timeline_json: Vec<Vec<u8>> = timeline
            .iter()
            .rev()
            .map(|e| serde_json::to_vec(e).unwrap())
            .collect();

        let record: OrderRecord = serde_json::from_slice(&record_json).unwrap();
        let timeline: Vec<TimelineEvent> = timeline_json
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
            .collect();

        let restored = Order::from_parts(record, timeline);
        assert_eq!(restored, order);
        assert!(restored.is_consistent());
    }

    #[test]
    fn test_apply_event_keeps_status_and_timeline_aligned() {
        let mut order = Order::placed("o-1".into(), "ORD100001".into(), sample_draft(), 5_000);
        // Clock went backwards: updated_at must not regress
        order.apply_event(TimelineEvent::new("o-1", 2, OrderStatus::Confirmed, None, None, 4_000));
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.version, 2);
        assert_eq!(order.updated_at, 5_000);
        assert!(order.is_consistent());
    }
}
