//! Shared types for order records and requests

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;

// ============================================================================
// Line Items
// ============================================================================

/// Line item snapshot - product data frozen at checkout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    /// Product ID
    pub product_id: String,
    /// Product name
    pub name: String,
    /// Variant label (e.g. "Black / 256GB")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Unit price at checkout
    pub unit_price: Decimal,
    /// Quantity
    pub quantity: u32,
    /// Image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl LineItem {
    /// unit_price * quantity
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

// ============================================================================
// Shipping
// ============================================================================

/// Shipping address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ShippingAddress {
    pub name: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// ============================================================================
// Payment
// ============================================================================

/// 支付方式 - only cash on delivery is offered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
}

/// 支付状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

// ============================================================================
// Requests
// ============================================================================

/// Order draft - submitted once when a cart is finalized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderDraft {
    /// Customer ID (None = guest checkout)
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
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Estimated delivery (human string or date)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<String>,
}

/// Admin order list filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderFilter {
    /// Exact status match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    /// Case-insensitive substring over order number, customer name and email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Whether an order passes this filter
    pub fn matches(&self, order: &super::Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    &order.order_number,
                    &order.customer_name,
                    &order.customer_email,
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}
