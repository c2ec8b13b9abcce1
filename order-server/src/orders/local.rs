//! Local order store - in-memory map with an optional JSON snapshot
//!
//! Used when no database is configured (`ORDER_STORE=local`) and by tests.
//!
//! With a snapshot path every mutation rewrites the file: the bytes are
//! encoded under a read lock, then written to a temp file, fsynced and
//! renamed on the blocking pool. A crash leaves either the old or the new
//! snapshot. The in-memory map only changes after the file is in place,
//! so readers never see a write that failed to persist.
//!
//! Writers are serialized by an async mutex held across the file write,
//! so snapshots land in mutation order. Readers are never blocked by I/O.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::order::{Order, OrderFilter};
use shared::util::format_order_number;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::traits::{
    OrderStore, StoreError, StoreResult, TimelineAppend, apply_append, sort_newest_first,
};

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    order_count: u64,
    orders: Vec<Order>,
}

/// Borrowed view of the next snapshot, encoded without cloning orders
#[derive(Serialize)]
struct SnapshotRef<'a> {
    order_count: u64,
    orders: Vec<&'a Order>,
}

#[derive(Debug, Default)]
struct State {
    order_count: u64,
    orders: HashMap<String, Order>,
}

impl State {
    /// Encode the state as it will be after the pending change
    fn encode_with(&self, order_count: u64, changed: Option<&Order>) -> StoreResult<Vec<u8>> {
        let orders = self
            .orders
            .values()
            .filter(|o| changed.is_none_or(|c| c.id != o.id))
            .chain(changed)
            .collect();
        let snapshot = SnapshotRef {
            order_count,
            orders,
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }
}

/// temp file + fsync + rename
fn write_snapshot(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&tmp, path)?;

    // Make the rename itself durable
    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[derive(Debug)]
pub struct LocalOrderStore {
    state: RwLock<State>,
    /// Held for the whole of a mutation, file write included
    writer: Mutex<()>,
    path: Option<PathBuf>,
}

impl LocalOrderStore {
    /// Volatile store, nothing touches disk
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(State::default()),
            writer: Mutex::new(()),
            path: None,
        }
    }

    /// Load the snapshot at `path` (missing file = empty store)
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                State {
                    order_count: snapshot.order_count,
                    orders: snapshot
                        .orders
                        .into_iter()
                        .map(|o| (o.id.clone(), o))
                        .collect(),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            path = %path.display(),
            orders = state.orders.len(),
            "Loaded local order snapshot"
        );

        Ok(Self {
            state: RwLock::new(state),
            writer: Mutex::new(()),
            path: Some(path),
        })
    }

    /// Persist the pending change. Callers hold `writer` and apply the
    /// change to memory only after this succeeds.
    async fn persist(&self, order_count: u64, changed: Option<&Order>) -> StoreResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let bytes = self.state.read().encode_with(order_count, changed)?;

        tokio::task::spawn_blocking(move || write_snapshot(&path, &bytes))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl OrderStore for LocalOrderStore {
    async fn next_order_number(&self) -> StoreResult<String> {
        let _writer = self.writer.lock().await;
        let next = self.state.read().order_count + 1;
        self.persist(next, None).await?;
        self.state.write().order_count = next;
        Ok(format_order_number(next))
    }

    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let _writer = self.writer.lock().await;
        let order_count = {
            let state = self.state.read();
            if state.orders.contains_key(&order.id) {
                return Err(StoreError::Duplicate(order.id.clone()));
            }
            if state
                .orders
                .values()
                .any(|o| o.order_number == order.order_number)
            {
                return Err(StoreError::Duplicate(order.order_number.clone()));
            }
            if let Some(tracking) = order.tracking_number.as_deref()
                && state
                    .orders
                    .values()
                    .any(|o| o.tracking_number.as_deref() == Some(tracking))
            {
                return Err(StoreError::Duplicate(tracking.to_string()));
            }
            state.order_count
        };

        self.persist(order_count, Some(order)).await?;
        self.state
            .write()
            .orders
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.state.read().orders.get(id).cloned())
    }

    async fn get_by_order_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .state
            .read()
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn get_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .state
            .read()
            .orders
            .values()
            .find(|o| o.tracking_number.as_deref() == Some(tracking_number))
            .cloned())
    }

    async fn list_by_customer(&self, customer_id: &str) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .read()
            .orders
            .values()
            .filter(|o| o.customer_id.as_deref() == Some(customer_id))
            .cloned()
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .state
            .read()
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        sort_newest_first(&mut orders);
        Ok(orders)
    }

    async fn append_timeline_event(
        &self,
        order_id: &str,
        append: TimelineAppend,
    ) -> StoreResult<Order> {
        let _writer = self.writer.lock().await;
        let (updated, order_count) = {
            let state = self.state.read();
            let current = state
                .orders
                .get(order_id)
                .cloned()
                .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
            let had_tracking = current.tracking_number.is_some();
            let updated = apply_append(current, append)?;

            if !had_tracking
                && let Some(tracking) = updated.tracking_number.as_deref()
                && state
                    .orders
                    .values()
                    .any(|o| o.id != order_id && o.tracking_number.as_deref() == Some(tracking))
            {
                return Err(StoreError::Duplicate(tracking.to_string()));
            }
            (updated, state.order_count)
        };

        self.persist(order_count, Some(&updated)).await?;
        self.state
            .write()
            .orders
            .insert(order_id.to_string(), updated.clone());
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::testing::{draft_for, placed_order};
    use shared::order::{OrderStatus, TimelineEvent};
    use shared::util::now_millis;

    fn append(order: &Order, status: OrderStatus, tracking: Option<&str>) -> TimelineAppend {
        TimelineAppend {
            expected_version: order.version,
            event: TimelineEvent::new(
                order.id.clone(),
                order.version + 1,
                status,
                None,
                None,
                order.updated_at + 1,
            ),
            tracking_number: tracking.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_lookups() {
        let store = LocalOrderStore::in_memory();
        let order = placed_order(&store, draft_for(Some("cust-1"))).await;
        let shipped = store
            .append_timeline_event(&order.id, append(&order, OrderStatus::Shipped, Some("TRK1")))
            .await
            .unwrap();

        assert_eq!(store.get_by_id(&order.id).await.unwrap(), Some(shipped.clone()));
        assert_eq!(
            store.get_by_order_number(&order.order_number).await.unwrap(),
            Some(shipped.clone())
        );
        assert_eq!(
            store.get_by_tracking_number("TRK1").await.unwrap(),
            Some(shipped)
        );
        assert_eq!(store.list_by_customer("cust-1").await.unwrap().len(), 1);
        assert!(store.list_by_customer("cust-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tracking_number_is_never_overwritten() {
        let store = LocalOrderStore::in_memory();
        let order = placed_order(&store, draft_for(None)).await;
        let shipped = store
            .append_timeline_event(&order.id, append(&order, OrderStatus::Shipped, Some("TRK1")))
            .await
            .unwrap();
        let out = store
            .append_timeline_event(
                &order.id,
                append(&shipped, OrderStatus::OutForDelivery, Some("TRK2")),
            )
            .await
            .unwrap();
        assert_eq!(out.tracking_number.as_deref(), Some("TRK1"));
        assert!(out.is_consistent());
    }

    #[tokio::test]
    async fn test_conflict_leaves_state_untouched() {
        let store = LocalOrderStore::in_memory();
        let order = placed_order(&store, draft_for(None)).await;
        store
            .append_timeline_event(&order.id, append(&order, OrderStatus::Confirmed, None))
            .await
            .unwrap();

        let err = store
            .append_timeline_event(&order.id, append(&order, OrderStatus::Cancelled, None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let current = store.get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(current.status, OrderStatus::Confirmed);
        assert_eq!(current.version, 2);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");

        let order = {
            let store = LocalOrderStore::open(&path).unwrap();
            let order = placed_order(&store, draft_for(Some("cust-1"))).await;
            store
                .append_timeline_event(&order.id, append(&order, OrderStatus::Confirmed, None))
                .await
                .unwrap()
        };

        assert!(!path.with_extension("json.tmp").exists());

        let store = LocalOrderStore::open(&path).unwrap();
        assert_eq!(store.get_by_id(&order.id).await.unwrap(), Some(order));
        assert_eq!(store.next_order_number().await.unwrap(), "ORD100002");
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = LocalOrderStore::open(&path).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("data");
        let store = LocalOrderStore::open(blocker.join("orders.json")).unwrap();

        // A plain file where the snapshot directory should be
        std::fs::write(&blocker, b"").unwrap();
        assert!(matches!(
            store.next_order_number().await.unwrap_err(),
            StoreError::Io(_)
        ));
        let order = Order::placed(
            "o-1".into(),
            "ORD100001".into(),
            draft_for(None),
            now_millis(),
        );
        assert!(store.insert(&order).await.is_err());
        assert!(store.get_by_id("o-1").await.unwrap().is_none());

        // Once the directory can be created the counter resumes where it was
        std::fs::remove_file(&blocker).unwrap();
        assert_eq!(store.next_order_number().await.unwrap(), "ORD100001");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_all_reach_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");
        let store = std::sync::Arc::new(LocalOrderStore::open(&path).unwrap());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    placed_order(store.as_ref(), draft_for(Some("cust-1"))).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let reopened = LocalOrderStore::open(&path).unwrap();
        assert_eq!(reopened.list_by_customer("cust-1").await.unwrap().len(), 20);
        assert_eq!(reopened.next_order_number().await.unwrap(), "ORD100021");
    }

    #[tokio::test]
    async fn test_tracking_number_collision_is_rejected() {
        let store = LocalOrderStore::in_memory();
        let first = placed_order(&store, draft_for(None)).await;
        let second = placed_order(&store, draft_for(None)).await;
        store
            .append_timeline_event(&first.id, append(&first, OrderStatus::Shipped, Some("TRK1")))
            .await
            .unwrap();

        let err = store
            .append_timeline_event(&second.id, append(&second, OrderStatus::Shipped, Some("TRK1")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(
            store.get_by_tracking_number("TRK1").await.unwrap().unwrap().id,
            first.id
        );
        assert_eq!(store.get_by_id(&second.id).await.unwrap().unwrap().version, 1);
    }
}
