use super::*;
use crate::orders::local::LocalOrderStore;
use crate::orders::storage::RedbOrderStore;
use crate::orders::testing::draft_for;
use rust_decimal::Decimal;
use shared::order::ProgressRank;


fn create_test_manager() -> OrdersManager {
    let store = RedbOrderStore::open_in_memory().unwrap();
    OrdersManager::new(Arc::new(store))
}

fn create_local_manager() -> OrdersManager {
    OrdersManager::new(Arc::new(LocalOrderStore::in_memory()))
}

// ========================================================================
// Helper: place an order through the manager
// ========================================================================

async fn place(manager: &OrdersManager) -> Order {
    manager.create_order(draft_for(Some("cust-1"))).await.unwrap()
}

async fn move_to(manager: &OrdersManager, order_id: &str, status: OrderStatus) -> Order {
    manager
        .transition(order_id, status, None, None)
        .await
        .unwrap_or_else(|e| panic!("transition to {status} failed: {e}"))
}
