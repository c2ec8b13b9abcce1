//! Test fixtures shared by store, manager and query tests

use rust_decimal::Decimal;
use shared::order::types::{LineItem, PaymentMethod, ShippingAddress};
use shared::order::{Order, OrderDraft};
use shared::util::now_millis;

use super::traits::OrderStore;

/// A valid single-line draft: one lamp at 49.99, quantity 2, plus 5.00 shipping
pub fn draft_for(customer_id: Option<&str>) -> OrderDraft {
    OrderDraft {
        customer_id: customer_id.map(str::to_string),
        customer_name: "Ada Obi".to_string(),
        customer_email: "ada@example.com".to_string(),
        items: vec![LineItem {
            product_id: "prod-lamp".to_string(),
            name: "Smart Lamp".to_string(),
            variant: Some("White".to_string()),
            unit_price: Decimal::new(4999, 2),
            quantity: 2,
            image: None,
        }],
        subtotal: Decimal::new(9998, 2),
        shipping_cost: Decimal::new(500, 2),
        tax: Decimal::ZERO,
        total: Decimal::new(10498, 2),
        shipping_address: ShippingAddress {
            name: "Ada Obi".to_string(),
            address_line1: "12 Marina Rd".to_string(),
            address_line2: None,
            city: "Lagos".to_string(),
            region: None,
            postal_code: "100001".to_string(),
            country: "NG".to_string(),
            phone: "+2348000000000".to_string(),
            email: None,
        },
        payment_method: PaymentMethod::CashOnDelivery,
        estimated_delivery: Some("3-5 business days".to_string()),
    }
}

/// Insert a freshly placed order directly through a store
pub async fn placed_order(store: &dyn OrderStore, draft: OrderDraft) -> Order {
    let number = store.next_order_number().await.unwrap();
    let order = Order::placed(uuid::Uuid::new_v4().to_string(), number, draft, now_millis());
    store.insert(&order).await.unwrap();
    order
}
