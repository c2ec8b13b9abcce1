//! Order Query Service - read side and live updates
//!
//! Serves the admin table and the customer tracking view. Live updates
//! come in two shapes over the same broadcast channel:
//!
//! - [`OrderWatch`]: pull-style, `next().await` per snapshot (SSE uses this)
//! - [`SubscriptionHandle`]: callback-style, with `unsubscribe()`
//!
//! Both deliver only snapshots newer than what they have already seen and
//! close after delivering a terminal snapshot.

use parking_lot::Mutex;
use shared::order::{Order, OrderFilter, OrderStatus, ProgressRank};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::{ManagerResult, OrderUpdate, OrdersManager};
use super::traits::OrderStore;

/// Progress-bar rank for a status (0..=3, or non-progressing)
pub fn progress_rank(status: OrderStatus) -> ProgressRank {
    status.progress_rank()
}

#[derive(Debug, Clone)]
pub struct OrderQueryService {
    manager: OrdersManager,
}

impl OrderQueryService {
    pub fn new(manager: OrdersManager) -> Self {
        Self { manager }
    }

    fn store(&self) -> &Arc<dyn OrderStore> {
        self.manager.store()
    }

    /// Exact match by id, then order number, then tracking number.
    ///
    /// For "track my order" input where the kind of identifier is unknown.
    pub async fn find(&self, query: &str) -> ManagerResult<Option<Order>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        if let Some(order) = self.store().get_by_id(query).await? {
            return Ok(Some(order));
        }
        if let Some(order) = self.store().get_by_order_number(query).await? {
            return Ok(Some(order));
        }
        Ok(self.store().get_by_tracking_number(query).await?)
    }

    pub async fn get(&self, order_id: &str) -> ManagerResult<Option<Order>> {
        Ok(self.store().get_by_id(order_id).await?)
    }

    /// Customer order history, newest first
    pub async fn list_by_customer(&self, customer_id: &str) -> ManagerResult<Vec<Order>> {
        Ok(self.store().list_by_customer(customer_id).await?)
    }

    /// Admin orders table, newest first
    pub async fn list_all(&self, filter: &OrderFilter) -> ManagerResult<Vec<Order>> {
        Ok(self.store().list_all(filter).await?)
    }

    /// Watch one order.
    ///
    /// Subscribes before reading so no update between the read and the
    /// subscription is lost. A missing or terminal order yields a watch that
    /// is already closed.
    pub async fn watch(&self, order_id: &str) -> ManagerResult<OrderWatch> {
        let rx = self.manager.subscribe();
        let current = self.store().get_by_id(order_id).await?;

        let open = current.as_ref().is_some_and(|o| !o.status.is_terminal());
        Ok(OrderWatch {
            order_id: order_id.to_string(),
            last_version: current.as_ref().map_or(0, |o| o.version),
            current,
            rx: open.then_some(rx),
            store: self.store().clone(),
        })
    }

    /// Invoke `on_update` with each new snapshot of the order.
    ///
    /// The callback never runs after [`SubscriptionHandle::unsubscribe`]
    /// returns. It must not call `unsubscribe` itself.
    pub async fn subscribe_to_updates<F>(
        &self,
        order_id: &str,
        on_update: F,
    ) -> ManagerResult<SubscriptionHandle>
    where
        F: FnMut(Order) + Send + 'static,
    {
        let mut watch = self.watch(order_id).await?;
        let callback: Arc<Mutex<Option<UpdateCallback>>> =
            Arc::new(Mutex::new(Some(Box::new(on_update))));
        let token = CancellationToken::new();

        let task = tokio::spawn({
            let token = token.clone();
            let callback = callback.clone();
            let order_id = order_id.to_string();
            async move {
                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => break,
                        next = watch.next() => next,
                    };
                    let Some(order) = next else {
                        break;
                    };

                    // Cancellation is re-checked under the callback lock
                    let mut slot = callback.lock();
                    if token.is_cancelled() {
                        break;
                    }
                    match slot.as_mut() {
                        Some(on_update) => on_update(order),
                        None => break,
                    }
                }
                callback.lock().take();
                tracing::debug!(order_id = %order_id, "Order subscription closed");
            }
        });

        Ok(SubscriptionHandle {
            token,
            callback,
            task: Some(task),
        })
    }
}

type UpdateCallback = Box<dyn FnMut(Order) + Send>;

/// Pull-style watch over one order's snapshots
pub struct OrderWatch {
    order_id: String,
    /// Snapshot read when the watch was created
    current: Option<Order>,
    last_version: u64,
    /// None once closed
    rx: Option<broadcast::Receiver<OrderUpdate>>,
    store: Arc<dyn OrderStore>,
}

impl std::fmt::Debug for OrderWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderWatch")
            .field("order_id", &self.order_id)
            .field("last_version", &self.last_version)
            .field("closed", &self.rx.is_none())
            .finish()
    }
}

impl OrderWatch {
    /// Snapshot at subscription time (None if the order did not exist)
    pub fn initial(&self) -> Option<&Order> {
        self.current.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    /// Next newer snapshot, or None once the watch is closed
    pub async fn next(&mut self) -> Option<Order> {
        loop {
            let rx = self.rx.as_mut()?;
            let received = rx.recv().await;

            match received {
                Ok(update) => {
                    if update.order.id == self.order_id && update.order.version > self.last_version
                    {
                        return Some(self.accept(update.order));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        order_id = %self.order_id,
                        skipped,
                        "Order watch lagged, re-reading current state"
                    );
                    match self.store.get_by_id(&self.order_id).await {
                        Ok(Some(order)) if order.version > self.last_version => {
                            return Some(self.accept(order));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(order_id = %self.order_id, error = %e, "Re-read after lag failed");
                        }
                    }
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    fn accept(&mut self, order: Order) -> Order {
        self.last_version = order.version;
        if order.status.is_terminal() {
            self.rx = None;
        }
        order
    }
}

/// Handle for a callback subscription; dropping it unsubscribes
pub struct SubscriptionHandle {
    token: CancellationToken,
    callback: Arc<Mutex<Option<UpdateCallback>>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl SubscriptionHandle {
    /// Stop delivery. No callback invocation starts after this returns,
    /// and one already running has finished.
    pub fn unsubscribe(&self) {
        self.token.cancel();
        // Waits for an in-flight invocation, then drops the callback
        self.callback.lock().take();
    }

    /// Still delivering updates
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.callback.lock().is_some()
    }

    /// Wait until the subscription ends on its own (terminal snapshot
    /// delivered, or the order cannot change any more).
    pub async fn closed(mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Order subscription task failed");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::storage::RedbOrderStore;
    use crate::orders::testing::draft_for;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn create_service() -> (OrdersManager, OrderQueryService) {
        let store = RedbOrderStore::open_in_memory().unwrap();
        let manager = OrdersManager::new(Arc::new(store));
        (manager.clone(), OrderQueryService::new(manager))
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Order>) -> Order {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("update not delivered in time")
            .expect("subscription closed early")
    }

    #[tokio::test]
    async fn test_find_by_any_identifier() {
        let (manager, queries) = create_service();
        let order = manager.create_order(draft_for(Some("cust-1"))).await.unwrap();
        let shipped = manager
            .transition(&order.id, OrderStatus::Shipped, None, None)
            .await
            .unwrap();
        let tracking = shipped.tracking_number.clone().unwrap();

        for query in [
            order.id.clone(),
            order.order_number.clone(),
            tracking,
            format!("  {}  ", order.order_number),
        ] {
            let found = queries.find(&query).await.unwrap().unwrap();
            assert_eq!(found, shipped);
        }

        assert!(queries.find("ORD999999").await.unwrap().is_none());
        assert!(queries.find("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listings() {
        let (manager, queries) = create_service();
        let first = manager.create_order(draft_for(Some("cust-1"))).await.unwrap();
        let second = manager.create_order(draft_for(Some("cust-1"))).await.unwrap();
        manager.create_order(draft_for(Some("cust-2"))).await.unwrap();

        let mine = queries.list_by_customer("cust-1").await.unwrap();
        let ids: Vec<_> = mine.iter().map(|o| o.id.clone()).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        manager
            .transition(&first.id, OrderStatus::Cancelled, None, None)
            .await
            .unwrap();
        let cancelled = queries
            .list_all(&OrderFilter::default().with_status(OrderStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].id, first.id);
        assert_eq!(queries.list_all(&OrderFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_timeline_returned_in_append_order() {
        let (manager, queries) = create_service();
        let order = manager.create_order(draft_for(None)).await.unwrap();
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
        ] {
            manager.transition(&order.id, status, None, None).await.unwrap();
        }

        let order = queries.get(&order.id).await.unwrap().unwrap();
        let sequences: Vec<u64> = order.timeline.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(order.timeline[3].status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_subscription_delivers_in_order_then_stops() {
        let (manager, queries) = create_service();
        let order = manager.create_order(draft_for(None)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = queries
            .subscribe_to_updates(&order.id, move |order| {
                let _ = tx.send(order);
            })
            .await
            .unwrap();

        manager
            .transition(&order.id, OrderStatus::Confirmed, None, None)
            .await
            .unwrap();
        manager
            .transition(&order.id, OrderStatus::Shipped, None, None)
            .await
            .unwrap();

        assert_eq!(recv(&mut rx).await.status, OrderStatus::Confirmed);
        assert_eq!(recv(&mut rx).await.status, OrderStatus::Shipped);

        handle.unsubscribe();
        assert!(!handle.is_active());

        manager
            .transition(&order.id, OrderStatus::OutForDelivery, None, None)
            .await
            .unwrap();

        // Callback (and its sender) are gone: the channel is closed and empty
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_handle_unsubscribes() {
        let (manager, queries) = create_service();
        let order = manager.create_order(draft_for(None)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Order>();
        let handle = queries
            .subscribe_to_updates(&order.id, move |order| {
                let _ = tx.send(order);
            })
            .await
            .unwrap();
        drop(handle);

        manager
            .transition(&order.id, OrderStatus::Confirmed, None, None)
            .await
            .unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscription_closes_after_terminal_snapshot() {
        let (manager, queries) = create_service();
        let order = manager.create_order(draft_for(None)).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = queries
            .subscribe_to_updates(&order.id, move |order| {
                let _ = tx.send(order.status);
            })
            .await
            .unwrap();

        manager
            .transition(&order.id, OrderStatus::Delivered, None, None)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle.closed())
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(OrderStatus::Delivered));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_watch_missing_or_terminal_order_is_closed() {
        let (manager, queries) = create_service();

        let mut missing = queries.watch("nope").await.unwrap();
        assert!(missing.is_closed());
        assert!(missing.initial().is_none());
        assert!(missing.next().await.is_none());

        let order = manager.create_order(draft_for(None)).await.unwrap();
        manager
            .transition(&order.id, OrderStatus::Returned, None, None)
            .await
            .unwrap();
        let mut done = queries.watch(&order.id).await.unwrap();
        assert!(done.is_closed());
        assert_eq!(
            done.initial().map(|o| o.status),
            Some(OrderStatus::Returned)
        );
        assert!(done.next().await.is_none());
    }

    #[tokio::test]
    async fn test_watch_ignores_other_orders() {
        let (manager, queries) = create_service();
        let mine = manager.create_order(draft_for(None)).await.unwrap();
        let other = manager.create_order(draft_for(None)).await.unwrap();

        let mut watch = queries.watch(&mine.id).await.unwrap();
        assert_eq!(watch.initial().map(|o| o.version), Some(1));

        manager
            .transition(&other.id, OrderStatus::Confirmed, None, None)
            .await
            .unwrap();
        manager
            .transition(&mine.id, OrderStatus::Processing, None, None)
            .await
            .unwrap();

        let next = watch.next().await.unwrap();
        assert_eq!(next.id, mine.id);
        assert_eq!(next.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_watch_recovers_from_lag() {
        let store = RedbOrderStore::open_in_memory().unwrap();
        let manager = OrdersManager::with_capacity(Arc::new(store), 2);
        let queries = OrderQueryService::new(manager.clone());
        let order = manager.create_order(draft_for(None)).await.unwrap();

        let mut watch = queries.watch(&order.id).await.unwrap();
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::OutForDelivery,
        ] {
            manager.transition(&order.id, status, None, None).await.unwrap();
        }

        // Overflowed the channel: the watch jumps to the latest state
        let next = watch.next().await.unwrap();
        assert_eq!(next.status, OrderStatus::OutForDelivery);
        assert_eq!(next.version, 5);
    }

    #[test]
    fn test_progress_rank_helper() {
        assert_eq!(progress_rank(OrderStatus::Placed), ProgressRank::Step(0));
        assert_eq!(progress_rank(OrderStatus::Processing), ProgressRank::Step(1));
        assert_eq!(progress_rank(OrderStatus::OutForDelivery), ProgressRank::Step(2));
        assert_eq!(progress_rank(OrderStatus::Delivered), ProgressRank::Step(3));
        assert_eq!(progress_rank(OrderStatus::Returned), ProgressRank::NonProgressing);
    }
}
