//! redb-based storage layer for orders and their timelines
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `OrderRecord` | Flat order record |
//! | `timeline` | `(order_id, sequence)` | `TimelineEvent` | Status history (append-only) |
//! | `order_numbers` | `order_number` | `order_id` | Order number index |
//! | `tracking_numbers` | `tracking_number` | `order_id` | Tracking number index |
//! | `customer_orders` | `(customer_id, order_id)` | `()` | Customer index |
//! | `sequence_counter` | `"order_count"` | `u64` | Order number counter |
//!
//! # Atomicity
//!
//! Every mutation is a single redb write transaction: the record, its
//! timeline event and any index rows commit together or not at all.
//! redb is synchronous, so the async trait methods run on `spawn_blocking`.

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::order::{Order, OrderFilter, OrderRecord, TimelineEvent};
use shared::util::format_order_number;
use std::path::Path;
use std::sync::Arc;

use super::traits::{
    OrderStore, StoreError, StoreResult, TimelineAppend, apply_append, sort_newest_first,
};

/// Table for order records: key = order_id, value = JSON-serialized OrderRecord
const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

/// Table for timeline events: key = (order_id, sequence), value = JSON-serialized TimelineEvent
const TIMELINE_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("timeline");

/// Index: order_number -> order_id
const ORDER_NUMBERS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_numbers");

/// Index: tracking_number -> order_id
const TRACKING_NUMBERS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("tracking_numbers");

/// Index: (customer_id, order_id) -> ()
const CUSTOMER_ORDERS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("customer_orders");

/// Counters: key = counter name, value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

const ORDER_COUNT_KEY: &str = "order_count";

/// Order store backed by redb
#[derive(Clone)]
pub struct RedbOrderStore {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbOrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbOrderStore").finish_non_exhaustive()
    }
}

impl RedbOrderStore {
    /// Open or create the database at the given path
    ///
    /// redb commits with `Durability::Immediate` by default: a commit is
    /// persistent once `commit()` returns, and the file is always in a
    /// consistent state after a crash.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        // Create all tables if they don't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ORDERS_TABLE)?;
            let _ = write_txn.open_table(TIMELINE_TABLE)?;
            let _ = write_txn.open_table(ORDER_NUMBERS_TABLE)?;
            let _ = write_txn.open_table(TRACKING_NUMBERS_TABLE)?;
            let _ = write_txn.open_table(CUSTOMER_ORDERS_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            if seq_table.get(ORDER_COUNT_KEY)?.is_none() {
                seq_table.insert(ORDER_COUNT_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Run a synchronous redb operation off the async runtime
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&RedbOrderStore) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    // ========== Counter ==========

    /// Get and increment order count atomically
    /// Returns the NEW count after increment
    pub fn next_order_count(&self) -> StoreResult<u64> {
        let txn = self.db.begin_write()?;
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table
            .get(ORDER_COUNT_KEY)?
            .map(|g| g.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(ORDER_COUNT_KEY, next)?;
        drop(table);
        txn.commit()?;
        Ok(next)
    }

    // ========== Writes ==========

    fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let (record, timeline) = order.clone().into_parts();

        let txn = self.db.begin_write()?;
        {
            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let mut numbers = txn.open_table(ORDER_NUMBERS_TABLE)?;

            if orders.get(record.id.as_str())?.is_some() {
                return Err(StoreError::Duplicate(record.id));
            }
            if numbers.get(record.order_number.as_str())?.is_some() {
                return Err(StoreError::Duplicate(record.order_number));
            }

            let value = serde_json::to_vec(&record)?;
            orders.insert(record.id.as_str(), value.as_slice())?;
            numbers.insert(record.order_number.as_str(), record.id.as_str())?;

            let mut events = txn.open_table(TIMELINE_TABLE)?;
            for event in &timeline {
                let value = serde_json::to_vec(event)?;
                events.insert((record.id.as_str(), event.sequence), value.as_slice())?;
            }

            if let Some(customer_id) = record.customer_id.as_deref() {
                let mut customers = txn.open_table(CUSTOMER_ORDERS_TABLE)?;
                customers.insert((customer_id, record.id.as_str()), ())?;
            }

            if let Some(tracking) = record.tracking_number.as_deref() {
                let mut tracking_table = txn.open_table(TRACKING_NUMBERS_TABLE)?;
                if tracking_table.get(tracking)?.is_some() {
                    return Err(StoreError::Duplicate(tracking.to_string()));
                }
                tracking_table.insert(tracking, record.id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    fn append_event(&self, order_id: &str, append: TimelineAppend) -> StoreResult<Order> {
        let txn = self.db.begin_write()?;
        let updated = {
            let mut orders = txn.open_table(ORDERS_TABLE)?;
            let mut events = txn.open_table(TIMELINE_TABLE)?;

            let current = load_order(&orders, &events, order_id)?
                .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
            let had_tracking = current.tracking_number.is_some();

            // Version check happens inside the write transaction
            let updated = apply_append(current, append)?;
            let (record, timeline) = updated.clone().into_parts();

            let value = serde_json::to_vec(&record)?;
            orders.insert(order_id, value.as_slice())?;

            if let Some(event) = timeline.last() {
                let value = serde_json::to_vec(event)?;
                events.insert((order_id, event.sequence), value.as_slice())?;
            }

            if !had_tracking && let Some(tracking) = record.tracking_number.as_deref() {
                let mut tracking_table = txn.open_table(TRACKING_NUMBERS_TABLE)?;
                // Never repoint an index entry owned by another order
                if tracking_table.get(tracking)?.is_some() {
                    return Err(StoreError::Duplicate(tracking.to_string()));
                }
                tracking_table.insert(tracking, order_id)?;
            }

            updated
        };
        txn.commit()?;
        Ok(updated)
    }

    // ========== Reads ==========

    /// Get an order with its timeline
    pub fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;
        let events = read_txn.open_table(TIMELINE_TABLE)?;
        load_order(&orders, &events, order_id)
    }

    fn get_via_index(
        &self,
        index: TableDefinition<'static, &'static str, &'static str>,
        key: &str,
    ) -> StoreResult<Option<Order>> {
        let read_txn = self.db.begin_read()?;
        let index_table = read_txn.open_table(index)?;
        let Some(order_id) = index_table.get(key)?.map(|g| g.value().to_string()) else {
            return Ok(None);
        };

        let orders = read_txn.open_table(ORDERS_TABLE)?;
        let events = read_txn.open_table(TIMELINE_TABLE)?;
        load_order(&orders, &events, &order_id)
    }

    fn customer_orders(&self, customer_id: &str) -> StoreResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let customers = read_txn.open_table(CUSTOMER_ORDERS_TABLE)?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;
        let events = read_txn.open_table(TIMELINE_TABLE)?;

        let mut result = Vec::new();
        for entry in customers.range((customer_id, "")..)? {
            let (key, _) = entry?;
            let (owner, order_id) = key.value();
            if owner != customer_id {
                break;
            }
            if let Some(order) = load_order(&orders, &events, order_id)? {
                result.push(order);
            }
        }

        sort_newest_first(&mut result);
        Ok(result)
    }

    fn all_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let read_txn = self.db.begin_read()?;
        let orders = read_txn.open_table(ORDERS_TABLE)?;
        let events = read_txn.open_table(TIMELINE_TABLE)?;

        let mut result = Vec::new();
        for entry in orders.iter()? {
            let (_key, value) = entry?;
            let record: OrderRecord = serde_json::from_slice(value.value())?;
            let timeline = load_timeline(&events, &record.id)?;
            let order = Order::from_parts(record, timeline);
            if filter.matches(&order) {
                result.push(order);
            }
        }

        sort_newest_first(&mut result);
        Ok(result)
    }
}

/// Load record + timeline from any readable view (read or write transaction)
fn load_order<O, T>(orders: &O, events: &T, order_id: &str) -> StoreResult<Option<Order>>
where
    O: ReadableTable<&'static str, &'static [u8]>,
    T: ReadableTable<(&'static str, u64), &'static [u8]>,
{
    let record: OrderRecord = match orders.get(order_id)? {
        Some(value) => serde_json::from_slice(value.value())?,
        None => return Ok(None),
    };
    let timeline = load_timeline(events, order_id)?;
    Ok(Some(Order::from_parts(record, timeline)))
}

fn load_timeline<T>(events: &T, order_id: &str) -> StoreResult<Vec<TimelineEvent>>
where
    T: ReadableTable<(&'static str, u64), &'static [u8]>,
{
    let mut timeline = Vec::new();
    let range_start = (order_id, 0u64);
    let range_end = (order_id, u64::MAX);

    for result in events.range(range_start..=range_end)? {
        let (_key, value) = result?;
        let event: TimelineEvent = serde_json::from_slice(value.value())?;
        timeline.push(event);
    }

    Ok(timeline)
}

#[async_trait]
impl OrderStore for RedbOrderStore {
    async fn next_order_number(&self) -> StoreResult<String> {
        let count = self.blocking(|store| store.next_order_count()).await?;
        Ok(format_order_number(count))
    }

    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let order = order.clone();
        self.blocking(move |store| store.insert_order(&order)).await
    }

    async fn get_by_id(&self, id: &str) -> StoreResult<Option<Order>> {
        let id = id.to_string();
        self.blocking(move |store| store.get_order(&id)).await
    }

    async fn get_by_order_number(&self, order_number: &str) -> StoreResult<Option<Order>> {
        let key = order_number.to_string();
        self.blocking(move |store| store.get_via_index(ORDER_NUMBERS_TABLE, &key))
            .await
    }

    async fn get_by_tracking_number(&self, tracking_number: &str) -> StoreResult<Option<Order>> {
        let key = tracking_number.to_string();
        self.blocking(move |store| store.get_via_index(TRACKING_NUMBERS_TABLE, &key))
            .await
    }

    async fn list_by_customer(&self, customer_id: &str) -> StoreResult<Vec<Order>> {
        let customer_id = customer_id.to_string();
        self.blocking(move |store| store.customer_orders(&customer_id))
            .await
    }

    async fn list_all(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let filter = filter.clone();
        self.blocking(move |store| store.all_orders(&filter)).await
    }

    async fn append_timeline_event(
        &self,
        order_id: &str,
        append: TimelineAppend,
    ) -> StoreResult<Order> {
        let order_id = order_id.to_string();
        self.blocking(move |store| store.append_event(&order_id, append))
            .await
    }
}
