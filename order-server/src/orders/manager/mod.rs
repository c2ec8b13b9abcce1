//! OrdersManager - status transition engine
//!
//! The only component that changes `order.status`. It handles:
//! - Draft validation and order creation (Placed + first timeline event)
//! - Transition guards (terminal lock, same-status idempotence)
//! - Tracking number assignment on first entry into transit
//! - Persistence through the [`OrderStore`] port (atomic append)
//! - Update broadcasting after commit
//!
//! # Transition Flow
//!
//! ```text
//! transition(order_id, status, description?, location?)
//!     ├─ 1. Acquire per-order lock
//!     ├─ 2. Load current order
//!     ├─ 3. Same status → return unchanged
//!     ├─ 4. Terminal → InvalidTransition
//!     ├─ 5. Build event (canonical description if none)
//!     ├─ 6. Append with expected version (Conflict if it moved)
//!     ├─ 7. Broadcast OrderUpdate
//!     └─ 8. Release lock (entry removed once no caller is waiting on it)
//! ```

mod error;
pub use error::*;

use super::traits::{OrderStore, StoreError, TimelineAppend};
use super::validation::{MAX_NOTE_LEN, validate_draft, validate_optional_text};
use dashmap::DashMap;
use rand::Rng;
use shared::order::{Order, OrderDraft, OrderStatus, TimelineEvent};
use shared::util::now_millis;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Default broadcast channel capacity
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Snapshot pushed to subscribers after every committed change
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order: Order,
}

/// Draws per transition before a tracking number collision is reported
const TRACKING_NUMBER_ATTEMPTS: u32 = 3;

/// 生成物流单号: TRK + 10 位随机数字
fn generate_tracking_number() -> String {
    let n: u64 = rand::thread_rng().gen_range(0..10_000_000_000);
    format!("TRK{n:010}")
}

/// Removes an order's lock entry once no caller holds or awaits it.
///
/// The strong count is checked under the shard lock, the same lock
/// `lock_for` takes, so a waiter never ends up on a detached mutex.
struct LockEntry<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    order_id: &'a str,
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        self.locks
            .remove_if(self.order_id, |_, entry| Arc::strong_count(entry) == 1);
    }
}

/// OrdersManager for order creation and status transitions
#[derive(Clone)]
pub struct OrdersManager {
    store: Arc<dyn OrderStore>,
    event_tx: broadcast::Sender<OrderUpdate>,
    /// Per-order write locks (in-process serialization)
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("store", &"<OrderStore>")
            .field("event_tx", &"<broadcast::Sender>")
            .field("locks", &self.locks.len())
            .finish()
    }
}

impl OrdersManager {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self::with_capacity(store, DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn OrderStore>, capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            store,
            event_tx,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Store handle for read paths
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Subscribe to update broadcasts (all orders)
    pub fn subscribe(&self) -> broadcast::Receiver<OrderUpdate> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, order: &Order) {
        // No receivers is normal when nobody is watching
        if self
            .event_tx
            .send(OrderUpdate {
                order: order.clone(),
            })
            .is_err()
        {
            tracing::trace!(order_id = %order.id, "No update subscribers");
        }
    }

    fn lock_for(&self, order_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(order_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create an order from a checkout draft.
    ///
    /// Validates, assigns id and order number, persists with the initial
    /// Placed event.
    pub async fn create_order(&self, draft: OrderDraft) -> ManagerResult<Order> {
        if let Err(e) = validate_draft(&draft) {
            tracing::warn!(error = %e, "Rejected order draft");
            return Err(e);
        }

        let order_number = self.store.next_order_number().await?;
        let id = uuid::Uuid::new_v4().to_string();
        let order = Order::placed(id, order_number, draft, now_millis());

        self.store.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            customer_id = ?order.customer_id,
            total = %order.total,
            items = order.items.len(),
            "Order placed"
        );
        self.broadcast(&order);
        Ok(order)
    }

    /// Move an order to `new_status`.
    ///
    /// Same status returns the order unchanged. A terminal order rejects any
    /// other status with `InvalidTransition`. The status change and its
    /// timeline event are stored as one unit.
    pub async fn transition(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        description: Option<String>,
        location: Option<String>,
    ) -> ManagerResult<Order> {
        validate_optional_text(&description, "description", MAX_NOTE_LEN)?;
        validate_optional_text(&location, "location", MAX_NOTE_LEN)?;

        // Declared first so it drops after the guard
        let _entry = LockEntry {
            locks: &self.locks,
            order_id,
        };
        let _guard = self.lock_for(order_id).lock_owned().await;

        self.transition_locked(order_id, new_status, description, location)
            .await
    }

    /// Steps 2-7 of the transition flow; the caller holds the order's lock
    async fn transition_locked(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        description: Option<String>,
        location: Option<String>,
    ) -> ManagerResult<Order> {
        let current = self
            .store
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(order_id.to_string()))?;

        if current.status == new_status {
            tracing::debug!(order_id, status = %new_status, "Same-status transition ignored");
            return Ok(current);
        }

        if !current.status.can_transition_to(new_status) {
            tracing::warn!(
                order_id,
                from = %current.status,
                to = %new_status,
                "Rejected transition from terminal state"
            );
            return Err(ManagerError::InvalidTransition {
                order_id: order_id.to_string(),
                from: current.status,
                to: new_status,
            });
        }

        let needs_tracking = new_status.is_in_transit() && current.tracking_number.is_none();
        let mut append = TimelineAppend {
            expected_version: current.version,
            event: TimelineEvent::new(
                order_id,
                current.version + 1,
                new_status,
                description,
                location,
                now_millis(),
            ),
            tracking_number: needs_tracking.then(generate_tracking_number),
        };

        let mut attempt = 1;
        let updated = loop {
            match self
                .store
                .append_timeline_event(order_id, append.clone())
                .await
            {
                Ok(order) => break order,
                // Tracking number already taken by another order: draw again
                Err(StoreError::Duplicate(taken))
                    if needs_tracking && attempt < TRACKING_NUMBER_ATTEMPTS =>
                {
                    tracing::warn!(order_id, tracking_number = %taken, "Tracking number collision");
                    append.tracking_number = Some(generate_tracking_number());
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        order_id,
                        from = %current.status,
                        to = %new_status,
                        version = current.version,
                        error = %e,
                        "Transition not applied"
                    );
                    return Err(e.into());
                }
            }
        };

        tracing::info!(
            order_id,
            from = %current.status,
            to = %updated.status,
            version = updated.version,
            tracking_number = ?updated.tracking_number,
            "Order status changed"
        );

        // Broadcast under the lock so subscribers see transitions in order
        self.broadcast(&updated);
        Ok(updated)
    }

    /// Parse the status text, then [`transition`](Self::transition)
    pub async fn transition_from_str(
        &self,
        order_id: &str,
        status: &str,
        description: Option<String>,
        location: Option<String>,
    ) -> ManagerResult<Order> {
        let new_status: OrderStatus = status.parse()?;
        self.transition(order_id, new_status, description, location)
            .await
    }

    /// Number of orders with a transition in flight
    pub fn active_lock_count(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests;
